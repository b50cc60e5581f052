pub mod audit_trail;
pub mod donations;
pub mod ingress;
pub mod reconciliation;
pub mod worker;
