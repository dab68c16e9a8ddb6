//! Authentication: credential lookup, session cache, and the two
//! authenticator strategies.

pub mod credentials;
pub mod device_code;
pub mod password;
pub mod session;

pub use credentials::{Credential, CredentialStore};
pub use device_code::{DeviceCodeAuthenticator, DeviceCodeConfig};
pub use password::PasswordAuthenticator;
pub use session::{Authenticator, IssuedToken, Session, SessionManager};
