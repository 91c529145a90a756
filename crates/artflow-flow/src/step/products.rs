//! Records produced by one step invocation.

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use crate::record::Record;

/// A boxed stream of products.
pub type ProductStream = BoxStream<'static, anyhow::Result<Record>>;

/// Whether a product stream is known to end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[derive(AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Extent {
    /// The stream ends on its own.
    #[default]
    Finite,
    /// The stream may never end and is truncated by the runner.
    Unbounded,
}

/// The records produced by one step invocation.
///
/// Products are consumed exactly once; the stream is never restarted.
pub struct Products {
    stream: ProductStream,
    extent: Extent,
}

impl Products {
    /// No products.
    pub fn empty() -> Self {
        Self::from_stream(stream::empty())
    }

    /// A single product.
    pub fn one(record: Record) -> Self {
        Self::from_stream(stream::once(async move { Ok(record) }))
    }

    /// A finite sequence of products.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = Record>,
        I::IntoIter: Send + 'static,
    {
        Self::from_stream(stream::iter(records.into_iter().map(Ok)))
    }

    /// A finite stream of products.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = anyhow::Result<Record>> + Send + 'static,
    {
        Self {
            stream: stream.boxed(),
            extent: Extent::Finite,
        }
    }

    /// A stream of products that may never end.
    pub fn unbounded<S>(stream: S) -> Self
    where
        S: Stream<Item = anyhow::Result<Record>> + Send + 'static,
    {
        Self {
            stream: stream.boxed(),
            extent: Extent::Unbounded,
        }
    }

    /// Returns the extent of the stream.
    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Consumes the products and returns the stream.
    pub fn into_stream(self) -> ProductStream {
        self.stream
    }
}

impl std::fmt::Debug for Products {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Products")
            .field("extent", &self.extent)
            .finish_non_exhaustive()
    }
}

/// Conversion of step function results into [`Products`].
pub trait IntoProducts {
    /// Converts the value into products.
    fn into_products(self) -> Products;
}

impl IntoProducts for Products {
    fn into_products(self) -> Products {
        self
    }
}

impl IntoProducts for Record {
    fn into_products(self) -> Products {
        Products::one(self)
    }
}

impl IntoProducts for Option<Record> {
    fn into_products(self) -> Products {
        match self {
            Some(record) => Products::one(record),
            None => Products::empty(),
        }
    }
}

impl IntoProducts for Vec<Record> {
    fn into_products(self) -> Products {
        Products::from_records(self)
    }
}
