#![doc(html_root_url = "https://docs.rs/keyed-dom/0.0.1")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod attribute;
pub mod decode;
pub mod diff;
pub mod effect;
pub mod events;
pub mod host;
pub mod load;
pub mod memory;
pub mod node;
pub mod patch;
pub mod path;
pub mod reconciler;
pub mod runtime;
pub mod web;

pub use attribute::Attr;
pub use decode::{DecodeError, Decoder};
pub use diff::diff;
pub use effect::{Actions, Effect};
pub use events::{EventRegistry, ResolveError};
pub use host::{Host, HostError, LiveNode};
pub use memory::{MemoryDom, MemoryEvent, MemoryNode};
pub use node::Node;
pub use patch::{Change, Patch};
pub use path::Path;
pub use reconciler::{EventDispatch, Reconciler};
pub use runtime::{mount, Application, MountError, MountOptions, RuntimeHandle};
pub use web::WebHost;
