//! Feed-specific pipeline stages.
//!
//! Each sub-module owns one step on the way from a URI to an [`Item`]:
//!
//! 1. [`http`] — fetch a URI into a shared [`Response`].
//! 2. [`content_type`] — group responses by `Content-Type`, keep XML.
//! 3. [`xml`] — check the body is a well-formed document, group by root.
//! 4. [`atom`] / [`rss`] — read the typed feed and flatten its entries.
//!
//! Every stage is a function from one [`Observable`](crate::rx::Observable)
//! to the next, so [`crate::pipeline`] can wire them together freely.
//!
//! ## For contributors — adding a new feed format
//!
//! 1. Create a new file in this directory modelled on `atom.rs`: a typed
//!    wrapper with a `from_document` constructor, a `parse` stage and an
//!    `entries` stage.
//! 2. Add a [`FeedKind`](item::FeedKind) variant and a [`SourceEntry`] variant for it.
//! 3. Route its root element name to the new branch in `pipeline.rs`.

pub mod atom;
pub mod content_type;
pub mod http;
mod item;
pub mod rss;
pub mod xml;

pub use http::{Fetch, HttpClient, Response};
pub use item::{Item, ItemData, ItemSource, SourceEntry};

use std::sync::Arc;

use clap::ValueEnum;
use tracing::warn;

use crate::error::FeedError;
use crate::rx::Subscriber;

/// What a stage does with a failure that concerns a single URI or document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum FailurePolicy {
    /// Log the failure and carry on with the next element.
    #[default]
    Isolate,
    /// End the stream with the failure, shutting the whole pipeline down.
    Abort,
}

impl FailurePolicy {
    /// Apply the policy to `error` on behalf of the stage feeding
    /// `downstream`.
    pub fn fail<T>(self, downstream: &Subscriber<T>, error: FeedError) {
        match self {
            FailurePolicy::Isolate => warn!(error = %error, "skipping"),
            FailurePolicy::Abort => downstream.error(Arc::new(error)),
        }
    }
}
