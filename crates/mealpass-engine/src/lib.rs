//! MealPass Engine — voucher issuance and redemption, opt-state
//! reconciliation, opt requests and absence accounting.
//!
//! Every service is generic over the `mealpass-core` repository traits
//! and reads time from an injected [`Clock`](mealpass_core::clock::Clock).

pub mod absence;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod issuer;
pub mod mail;
pub mod opt;
pub mod reconciler;
pub mod redemption;

pub use absence::{AbsenceAccountant, AbsenceReport, accounting_periods};
pub use checkpoint::{CheckpointOutcome, CheckpointRunner};
pub use config::{AbsencePeriod, AbsencePolicy, EngineConfig};
pub use error::EngineError;
pub use issuer::{IssueReport, VoucherIssuer};
pub use mail::{LogMailNotifier, MailNotifier, WarningKind, WarningMail};
pub use opt::OptService;
pub use reconciler::{ReconcileReport, ReconcileStep, Reconciler};
pub use redemption::{RedeemOutcome, RedemptionService};
