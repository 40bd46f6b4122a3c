//! PostgreSQL storage backend on the sqlx runtime query API.
//!
//! Row models mirror the relational schema and convert into the domain
//! types; statuses travel as TEXT and parse through the state machine's
//! `FromStr` impls. One [`StorageTx`] wraps one SQL transaction; sqlx
//! rolls back automatically when the transaction drops uncommitted.
//!
//! The at-most-one-active-correction invariant is the partial unique
//! index `uq_corrections_one_active` (see `migrations/0001_init.sql`);
//! the resulting unique violation maps to `DuplicateActiveCorrection`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use super::{Storage, StorageTx};
use crate::error::{ProposalError, Result};
use crate::models::{
    BranchToken, Correction, FieldMap, NewBranchToken, NewCorrection, NewProcess, NewProposal,
    NewSignal, NewSplitInstance, NewTask, NewVersion, ProcessInstance, Proposal, Signal,
    SplitInstance, Task, UserId, Version,
};
use crate::state_machine::{ProcessStatus, TaskStatus};

#[derive(Debug, Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Apply the bundled schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ProposalError::Storage(e.to_string()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn begin(&self) -> Result<Box<dyn StorageTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[derive(FromRow)]
struct ProposalRow {
    id: i64,
    client: String,
    fields: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProposalRow {
    fn into_domain(self) -> Result<Proposal> {
        Ok(Proposal {
            id: self.id,
            client: self.client,
            fields: parse_field_map(self.fields)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ProcessRow {
    id: i64,
    flow: String,
    proposal_id: i64,
    status: String,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl ProcessRow {
    fn into_domain(self) -> Result<ProcessInstance> {
        Ok(ProcessInstance {
            id: self.id,
            flow: self.flow,
            proposal_id: self.proposal_id,
            status: self.status.parse().map_err(ProposalError::Storage)?,
            created_at: self.created_at,
            finished_at: self.finished_at,
        })
    }
}

#[derive(FromRow)]
struct TaskRow {
    id: i64,
    process_id: i64,
    node: String,
    status: String,
    owner: Option<String>,
    branch_id: Option<i64>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl TaskRow {
    fn into_domain(self) -> Result<Task> {
        Ok(Task {
            id: self.id,
            process_id: self.process_id,
            node: self.node,
            status: self.status.parse().map_err(ProposalError::Storage)?,
            owner: self.owner,
            branch_id: self.branch_id,
            created_at: self.created_at,
            finished_at: self.finished_at,
        })
    }
}

#[derive(FromRow)]
struct VersionRow {
    id: i64,
    proposal_id: i64,
    author: String,
    step: String,
    snapshot: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl VersionRow {
    fn into_domain(self) -> Result<Version> {
        Ok(Version {
            id: self.id,
            proposal_id: self.proposal_id,
            author: self.author,
            step: self.step,
            snapshot: parse_field_map(self.snapshot)?,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct CorrectionRow {
    id: i64,
    proposal_id: i64,
    task_id: i64,
    for_step: String,
    reviewed_version_id: i64,
    messages: serde_json::Value,
    is_active: bool,
    author: String,
    created_at: DateTime<Utc>,
    fixed_in_version_id: Option<i64>,
}

impl CorrectionRow {
    fn into_domain(self) -> Result<Correction> {
        Ok(Correction {
            id: self.id,
            proposal_id: self.proposal_id,
            task_id: self.task_id,
            for_step: self.for_step,
            reviewed_version_id: self.reviewed_version_id,
            messages: serde_json::from_value(self.messages)
                .map_err(|e| ProposalError::Storage(format!("invalid correction messages: {e}")))?,
            is_active: self.is_active,
            author: self.author,
            created_at: self.created_at,
            fixed_in_version_id: self.fixed_in_version_id,
        })
    }
}

#[derive(FromRow)]
struct SplitRow {
    id: i64,
    process_id: i64,
    node: String,
    consumed: bool,
    created_at: DateTime<Utc>,
}

impl SplitRow {
    fn into_domain(self) -> SplitInstance {
        SplitInstance {
            id: self.id,
            process_id: self.process_id,
            node: self.node,
            consumed: self.consumed,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct BranchRow {
    id: i64,
    split_id: i64,
    target_node: String,
    done: bool,
    created_at: DateTime<Utc>,
}

impl BranchRow {
    fn into_domain(self) -> BranchToken {
        BranchToken {
            id: self.id,
            split_id: self.split_id,
            target_node: self.target_node,
            done: self.done,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct SignalRow {
    id: i64,
    proposal_id: i64,
    kind: String,
    received_at: DateTime<Utc>,
}

fn parse_field_map(value: serde_json::Value) -> Result<FieldMap> {
    serde_json::from_value(value)
        .map_err(|e| ProposalError::Storage(format!("invalid field map: {e}")))
}

fn not_found(entity: &'static str, id: i64) -> impl FnOnce(sqlx::Error) -> ProposalError {
    move |err| match err {
        sqlx::Error::RowNotFound => ProposalError::NotFound { entity, id },
        other => other.into(),
    }
}

#[async_trait]
impl StorageTx for PgTx {
    async fn insert_process(&mut self, new: NewProcess) -> Result<ProcessInstance> {
        sqlx::query_as::<_, ProcessRow>(
            r#"
            INSERT INTO process_instances (flow, proposal_id, status)
            VALUES ($1, $2, 'ACTIVE')
            RETURNING id, flow, proposal_id, status, created_at, finished_at
            "#,
        )
        .bind(&new.flow)
        .bind(new.proposal_id)
        .fetch_one(&mut *self.tx)
        .await?
        .into_domain()
    }

    async fn get_process(&mut self, id: i64) -> Result<ProcessInstance> {
        sqlx::query_as::<_, ProcessRow>(
            "SELECT id, flow, proposal_id, status, created_at, finished_at
             FROM process_instances WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(not_found("process", id))?
        .into_domain()
    }

    async fn update_process_status(
        &mut self,
        id: i64,
        status: ProcessStatus,
    ) -> Result<ProcessInstance> {
        sqlx::query_as::<_, ProcessRow>(
            r#"
            UPDATE process_instances
            SET status = $2,
                finished_at = CASE WHEN $3 THEN now() ELSE finished_at END
            WHERE id = $1
            RETURNING id, flow, proposal_id, status, created_at, finished_at
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(status.is_terminal())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(not_found("process", id))?
        .into_domain()
    }

    async fn processes_for_proposal(&mut self, proposal_id: i64) -> Result<Vec<ProcessInstance>> {
        sqlx::query_as::<_, ProcessRow>(
            "SELECT id, flow, proposal_id, status, created_at, finished_at
             FROM process_instances WHERE proposal_id = $1 ORDER BY id",
        )
        .bind(proposal_id)
        .fetch_all(&mut *self.tx)
        .await?
        .into_iter()
        .map(ProcessRow::into_domain)
        .collect()
    }

    async fn insert_proposal(&mut self, new: NewProposal) -> Result<Proposal> {
        sqlx::query_as::<_, ProposalRow>(
            r#"
            INSERT INTO proposals (client, fields)
            VALUES ($1, $2)
            RETURNING id, client, fields, created_at, updated_at
            "#,
        )
        .bind(&new.client)
        .bind(serde_json::to_value(&new.fields).unwrap_or_default())
        .fetch_one(&mut *self.tx)
        .await?
        .into_domain()
    }

    async fn get_proposal(&mut self, id: i64) -> Result<Proposal> {
        sqlx::query_as::<_, ProposalRow>(
            "SELECT id, client, fields, created_at, updated_at FROM proposals WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(not_found("proposal", id))?
        .into_domain()
    }

    async fn update_proposal_fields(&mut self, id: i64, fields: FieldMap) -> Result<Proposal> {
        sqlx::query_as::<_, ProposalRow>(
            r#"
            UPDATE proposals SET fields = $2, updated_at = now()
            WHERE id = $1
            RETURNING id, client, fields, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(serde_json::to_value(&fields).unwrap_or_default())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(not_found("proposal", id))?
        .into_domain()
    }

    async fn insert_task(&mut self, new: NewTask) -> Result<Task> {
        sqlx::query_as::<_, TaskRow>(
            r#"
            INSERT INTO tasks (process_id, node, status, owner, branch_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, process_id, node, status, owner, branch_id, created_at, finished_at
            "#,
        )
        .bind(new.process_id)
        .bind(&new.node)
        .bind(new.status.to_string())
        .bind(&new.owner)
        .bind(new.branch_id)
        .fetch_one(&mut *self.tx)
        .await?
        .into_domain()
    }

    async fn get_task(&mut self, id: i64) -> Result<Task> {
        sqlx::query_as::<_, TaskRow>(
            "SELECT id, process_id, node, status, owner, branch_id, created_at, finished_at
             FROM tasks WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(not_found("task", id))?
        .into_domain()
    }

    async fn update_task_status(
        &mut self,
        id: i64,
        status: TaskStatus,
        owner: Option<UserId>,
    ) -> Result<Task> {
        sqlx::query_as::<_, TaskRow>(
            r#"
            UPDATE tasks
            SET status = $2,
                owner = COALESCE($3, owner),
                finished_at = CASE WHEN $4 THEN now() ELSE finished_at END
            WHERE id = $1
            RETURNING id, process_id, node, status, owner, branch_id, created_at, finished_at
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(owner)
        .bind(status.is_terminal())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(not_found("task", id))?
        .into_domain()
    }

    async fn tasks_for(
        &mut self,
        process_id: i64,
        node: Option<&str>,
        status: Option<TaskStatus>,
    ) -> Result<Vec<Task>> {
        sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, process_id, node, status, owner, branch_id, created_at, finished_at
            FROM tasks
            WHERE process_id = $1
              AND ($2::text IS NULL OR node = $2)
              AND ($3::text IS NULL OR status = $3)
            ORDER BY id
            "#,
        )
        .bind(process_id)
        .bind(node)
        .bind(status.map(|s| s.to_string()))
        .fetch_all(&mut *self.tx)
        .await?
        .into_iter()
        .map(TaskRow::into_domain)
        .collect()
    }

    async fn insert_version(&mut self, new: NewVersion) -> Result<Version> {
        sqlx::query_as::<_, VersionRow>(
            r#"
            INSERT INTO versions (proposal_id, author, step, snapshot)
            VALUES ($1, $2, $3, $4)
            RETURNING id, proposal_id, author, step, snapshot, created_at
            "#,
        )
        .bind(new.proposal_id)
        .bind(&new.author)
        .bind(&new.step)
        .bind(serde_json::to_value(&new.snapshot).unwrap_or_default())
        .fetch_one(&mut *self.tx)
        .await?
        .into_domain()
    }

    async fn get_version(&mut self, id: i64) -> Result<Version> {
        sqlx::query_as::<_, VersionRow>(
            "SELECT id, proposal_id, author, step, snapshot, created_at
             FROM versions WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(not_found("version", id))?
        .into_domain()
    }

    async fn latest_version(&mut self, proposal_id: i64) -> Result<Option<Version>> {
        sqlx::query_as::<_, VersionRow>(
            r#"
            SELECT id, proposal_id, author, step, snapshot, created_at
            FROM versions
            WHERE proposal_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(proposal_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(VersionRow::into_domain)
        .transpose()
    }

    async fn insert_correction(&mut self, new: NewCorrection) -> Result<Correction> {
        let result = sqlx::query_as::<_, CorrectionRow>(
            r#"
            INSERT INTO corrections
                (proposal_id, task_id, for_step, reviewed_version_id, messages, is_active, author)
            VALUES ($1, $2, $3, $4, $5, TRUE, $6)
            RETURNING id, proposal_id, task_id, for_step, reviewed_version_id, messages,
                      is_active, author, created_at, fixed_in_version_id
            "#,
        )
        .bind(new.proposal_id)
        .bind(new.task_id)
        .bind(&new.for_step)
        .bind(new.reviewed_version_id)
        .bind(serde_json::to_value(&new.messages).unwrap_or_default())
        .bind(&new.author)
        .fetch_one(&mut *self.tx)
        .await;

        match result {
            Ok(row) => row.into_domain(),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(ProposalError::DuplicateActiveCorrection {
                    proposal_id: new.proposal_id,
                    for_step: new.for_step,
                })
            }
            Err(other) => Err(other.into()),
        }
    }

    async fn active_corrections(
        &mut self,
        proposal_id: i64,
        for_step: Option<&str>,
    ) -> Result<Vec<Correction>> {
        sqlx::query_as::<_, CorrectionRow>(
            r#"
            SELECT id, proposal_id, task_id, for_step, reviewed_version_id, messages,
                   is_active, author, created_at, fixed_in_version_id
            FROM corrections
            WHERE proposal_id = $1
              AND is_active
              AND ($2::text IS NULL OR for_step = $2)
            ORDER BY id
            "#,
        )
        .bind(proposal_id)
        .bind(for_step)
        .fetch_all(&mut *self.tx)
        .await?
        .into_iter()
        .map(CorrectionRow::into_domain)
        .collect()
    }

    async fn latest_correction(
        &mut self,
        proposal_id: i64,
        for_step: &str,
    ) -> Result<Option<Correction>> {
        sqlx::query_as::<_, CorrectionRow>(
            r#"
            SELECT id, proposal_id, task_id, for_step, reviewed_version_id, messages,
                   is_active, author, created_at, fixed_in_version_id
            FROM corrections
            WHERE proposal_id = $1 AND for_step = $2
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(proposal_id)
        .bind(for_step)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(CorrectionRow::into_domain)
        .transpose()
    }

    async fn resolve_correction(
        &mut self,
        id: i64,
        fixed_in_version_id: i64,
    ) -> Result<Correction> {
        sqlx::query_as::<_, CorrectionRow>(
            r#"
            UPDATE corrections
            SET is_active = FALSE,
                fixed_in_version_id = CASE WHEN is_active THEN $2 ELSE fixed_in_version_id END
            WHERE id = $1
            RETURNING id, proposal_id, task_id, for_step, reviewed_version_id, messages,
                      is_active, author, created_at, fixed_in_version_id
            "#,
        )
        .bind(id)
        .bind(fixed_in_version_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(not_found("correction", id))?
        .into_domain()
    }

    async fn insert_split(&mut self, new: NewSplitInstance) -> Result<SplitInstance> {
        Ok(sqlx::query_as::<_, SplitRow>(
            r#"
            INSERT INTO split_instances (process_id, node)
            VALUES ($1, $2)
            RETURNING id, process_id, node, consumed, created_at
            "#,
        )
        .bind(new.process_id)
        .bind(&new.node)
        .fetch_one(&mut *self.tx)
        .await?
        .into_domain())
    }

    async fn open_split(&mut self, process_id: i64, node: &str) -> Result<Option<SplitInstance>> {
        Ok(sqlx::query_as::<_, SplitRow>(
            r#"
            SELECT id, process_id, node, consumed, created_at
            FROM split_instances
            WHERE process_id = $1 AND node = $2 AND NOT consumed
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(process_id)
        .bind(node)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(SplitRow::into_domain))
    }

    async fn consume_split(&mut self, id: i64) -> Result<()> {
        sqlx::query("UPDATE split_instances SET consumed = TRUE WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_branch(&mut self, new: NewBranchToken) -> Result<BranchToken> {
        Ok(sqlx::query_as::<_, BranchRow>(
            r#"
            INSERT INTO branch_tokens (split_id, target_node)
            VALUES ($1, $2)
            RETURNING id, split_id, target_node, done, created_at
            "#,
        )
        .bind(new.split_id)
        .bind(&new.target_node)
        .fetch_one(&mut *self.tx)
        .await?
        .into_domain())
    }

    async fn get_branch(&mut self, id: i64) -> Result<BranchToken> {
        Ok(sqlx::query_as::<_, BranchRow>(
            "SELECT id, split_id, target_node, done, created_at FROM branch_tokens WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(not_found("branch", id))?
        .into_domain())
    }

    async fn complete_branch(&mut self, id: i64) -> Result<BranchToken> {
        Ok(sqlx::query_as::<_, BranchRow>(
            r#"
            UPDATE branch_tokens SET done = TRUE
            WHERE id = $1
            RETURNING id, split_id, target_node, done, created_at
            "#,
        )
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(not_found("branch", id))?
        .into_domain())
    }

    async fn branches_for_split(&mut self, split_id: i64) -> Result<Vec<BranchToken>> {
        Ok(sqlx::query_as::<_, BranchRow>(
            "SELECT id, split_id, target_node, done, created_at
             FROM branch_tokens WHERE split_id = $1 ORDER BY id",
        )
        .bind(split_id)
        .fetch_all(&mut *self.tx)
        .await?
        .into_iter()
        .map(BranchRow::into_domain)
        .collect())
    }

    async fn insert_signal(&mut self, new: NewSignal) -> Result<Signal> {
        let row = sqlx::query_as::<_, SignalRow>(
            r#"
            INSERT INTO signals (proposal_id, kind)
            VALUES ($1, $2)
            RETURNING id, proposal_id, kind, received_at
            "#,
        )
        .bind(new.proposal_id)
        .bind(&new.kind)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(Signal {
            id: row.id,
            proposal_id: row.proposal_id,
            kind: row.kind,
            received_at: row.received_at,
        })
    }

    async fn has_signal(&mut self, proposal_id: i64, kind: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM signals WHERE proposal_id = $1 AND kind = $2",
        )
        .bind(proposal_id)
        .bind(kind)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count > 0)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
