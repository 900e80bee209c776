pub mod smtp;
pub mod traits;

pub use smtp::SmtpNotifier;
pub use traits::{Alert, Notifier, NotifyError};
