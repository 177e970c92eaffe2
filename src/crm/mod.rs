//! Outbound CRM integrations.

pub mod salesforce;

pub use salesforce::SalesforceClient;
