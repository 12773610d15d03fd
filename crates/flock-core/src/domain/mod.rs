//! Domain model (ids, messages, event envelopes, dead-letter records, errors).

pub mod dead_letter;
pub mod errors;
pub mod ids;
pub mod message;
pub mod user;

pub use dead_letter::{DeadLetterCategory, DeadLetterEntry, DeadLetterId};
pub use errors::{
    CodecError, DeadLetterError, ErrorKind, FeedStoreError, FlockError, PublishError,
    RepositoryError, SubscriptionError,
};
pub use ids::{MessageId, UserId};
pub use message::{EventEnvelope, Message};
pub use user::User;
