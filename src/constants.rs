//! Shared constants: tracked field names, sentinel keys, event names and
//! external signal kinds.
//!
//! These are part of the public contract — the notification collaborator
//! matches on [`events`] names, and form layers key correction messages by
//! the field names listed here.

/// Sentinel correction key addressing the whole record instead of a single
/// field. A fix submission against it must change at least one field.
pub const ALL_FIELDS: &str = "__all__";

/// Tracked proposal fields. Every committed version snapshots exactly this
/// set; diffing and correction validation are restricted to it.
pub mod fields {
    pub const COUNTRY: &str = "country";
    pub const CITY: &str = "city";
    pub const COMPANY_NAME: &str = "company_name";
    pub const INN: &str = "inn";
    pub const BANK_NAME: &str = "bank_name";
    pub const ACCOUNT_NUMBER: &str = "account_number";
    pub const IS_NEEDS_BIBSERVE_ACCOUNT: &str = "is_needs_bibserve_account";

    // Derived codes and account data added by back-office steps.
    pub const J_CODE: &str = "j_code";
    pub const D_CODE: &str = "d_code";
    pub const CREDIT_LIMIT: &str = "credit_limit";
    pub const BIBSERVE_LOGIN: &str = "bibserve_login";
    pub const BIBSERVE_EMAIL: &str = "bibserve_email";
    pub const ACS_NAME: &str = "acs_name";
    pub const ACS_EMAIL: &str = "acs_email";

    // Delivery and warehouse data carried by the paper-docs sub-process.
    pub const DELIVERY_ADDRESS: &str = "delivery_address";
    pub const DELIVERY_CITY: &str = "delivery_city";
    pub const DELIVERY_CONTACT: &str = "delivery_contact";
    pub const WAREHOUSE_CONSIGNEE_CODE: &str = "warehouse_consignee_code";
    pub const WAREHOUSE_WORKING_HOURS: &str = "warehouse_working_hours";

    /// Fields the client supplies on the initial form.
    pub const CLIENT_EDITABLE: &[&str] = &[
        COUNTRY,
        CITY,
        COMPANY_NAME,
        INN,
        BANK_NAME,
        ACCOUNT_NUMBER,
        IS_NEEDS_BIBSERVE_ACCOUNT,
    ];
}

/// Lifecycle event names published on the broadcast channel.
pub mod events {
    /// A task was newly created for a node. Payload: process id, proposal
    /// id, node name, task id, owner (when auto-assigned).
    pub const TASK_CREATED: &str = "task.created";

    /// A process instance reached its End node. Payload: process id,
    /// proposal id, flow name.
    pub const PROCESS_COMPLETED: &str = "process.completed";
}

/// External signal kinds observed by `ExternalSignal` nodes.
pub mod signals {
    /// The client's account was unblocked in the billing system. Gates
    /// BibServe account activation.
    pub const CLIENT_UNBLOCKED: &str = "client_unblocked";
}
