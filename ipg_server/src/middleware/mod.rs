mod access_token;
mod acl;
mod signature;

pub use access_token::{AccessTokenMiddlewareFactory, AccessTokenMiddlewareService};
pub use acl::{AclMiddlewareFactory, AclMiddlewareService};
pub use signature::{WebhookSignatureFactory, WebhookSignatureService};
