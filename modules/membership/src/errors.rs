//! Error catalog for the membership REST surface.
use http_errors::ErrDef;

pub const USER_NOT_FOUND: ErrDef = ErrDef::new(404, "MEMBERSHIP_USER_NOT_FOUND", "User not found");
pub const INVOICE_NOT_FOUND: ErrDef =
    ErrDef::new(404, "MEMBERSHIP_INVOICE_NOT_FOUND", "Invoice not found");
pub const CONTRACT_FINALIZED: ErrDef =
    ErrDef::new(409, "MEMBERSHIP_CONTRACT_FINALIZED", "Contract already finalized");
pub const DATES_LOCKED: ErrDef =
    ErrDef::new(409, "MEMBERSHIP_DATES_LOCKED", "Invoice dates already saved");
pub const INVOICE_EXISTS: ErrDef =
    ErrDef::new(409, "MEMBERSHIP_INVOICE_EXISTS", "Invoice already exists");
pub const VALIDATION: ErrDef = ErrDef::new(400, "MEMBERSHIP_VALIDATION", "Validation error");
pub const UNAUTHORIZED: ErrDef = ErrDef::new(401, "MEMBERSHIP_UNAUTHORIZED", "Unauthorized");
pub const BATCH_DISABLED: ErrDef =
    ErrDef::new(403, "MEMBERSHIP_BATCH_DISABLED", "Batch endpoints disabled");
pub const INTERNAL: ErrDef = ErrDef::new(500, "INTERNAL_DB", "Internal error");
