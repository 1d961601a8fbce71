//! Markup Construction
//!
//! Containers and the keying rules that give reactive fragments their
//! client-side addresses.
//!
//! Containers are not reactive themselves. Building one scans its children
//! and attribute values once, claims an address for each bare fragment, and
//! returns plain [`Markup`](crate::reactive::Markup): literal text
//! interleaved with the fragments it embeds.

pub mod element;
pub mod tags;

pub use element::{escape_attr, AttrValue, Child, Element, VoidElement};
