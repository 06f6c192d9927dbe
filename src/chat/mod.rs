//! Chat client collaborator and the snapshot data model.

pub mod client;
pub mod types;

pub use client::{ChatClient, ClientError, TokenOrProvider};
pub use types::{
  CachedMessage, CachedUser, Channel, ChannelSnapshot, ClientSnapshot, Message, OrderedChannel,
  StateSnapshot, User, UserIdentity,
};
