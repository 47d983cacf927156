//! Driver capability contract.
//!
//! A driver exposes an open set of named operations through an
//! [`OperationTable`]. The table is built once per driver type and shared by
//! every instance; a verb reaches an operation only if the table has an entry
//! under the verb's canonical name.
//!
//! ```ignore
//! impl Driver for GraphDriver {
//!     fn operations() -> OperationTable<Self> {
//!         let mut table = OperationTable::new();
//!         table
//!             .register("info", Signature::none(), |d, _| Ok(Reply::value(d.describe())))
//!             .register(
//!                 "data",
//!                 Signature::required(&["types"]).with_optional(&["links"]),
//!                 GraphDriver::data,
//!             );
//!         table
//!     }
//! }
//! ```

use crate::dispatch::canonical_operation_name;
use crate::error::DriverError;
use futures::stream::{self, BoxStream, StreamExt};
use futures::Stream;
use grapher_protocol::ArgumentMap;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A pluggable backend.
pub trait Driver: Send + Sized + 'static {
    /// Builds the table of operations this driver type exposes.
    fn operations() -> OperationTable<Self>;
}

/// What an operation produced.
pub enum Reply {
    /// Nothing to send besides the closing `Done`.
    Empty,
    /// A single reply object.
    Value(Value),
    /// An ordered sequence of reply objects.
    Stream(BoxStream<'static, Value>),
}

impl Reply {
    pub fn value(value: Value) -> Self {
        Reply::Value(value)
    }

    /// Wraps an in-memory sequence of items.
    pub fn items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: Send + 'static,
    {
        Reply::Stream(stream::iter(items).boxed())
    }

    /// Wraps an asynchronous sequence of items.
    pub fn stream<S>(items: S) -> Self
    where
        S: Stream<Item = Value> + Send + 'static,
    {
        Reply::Stream(items.boxed())
    }

    /// Turns the reply into the sequence of candidate frames.
    ///
    /// A falsy single value (`null`, `false`, `0`, `""`, `[]`, `{}`) counts
    /// as no result.
    pub fn into_stream(self) -> BoxStream<'static, Value> {
        match self {
            Reply::Empty => stream::empty().boxed(),
            Reply::Value(value) if is_falsy(&value) => stream::empty().boxed(),
            Reply::Value(value) => stream::once(async move { value }).boxed(),
            Reply::Stream(items) => items,
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Empty => f.write_str("Empty"),
            Reply::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Reply::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<()> for Reply {
    fn from(_: ()) -> Self {
        Reply::Empty
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Value(value)
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
    }
}

/// Argument names an operation accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    required: Vec<&'static str>,
    optional: Vec<&'static str>,
}

impl Signature {
    /// An operation that takes no arguments.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn required(names: &[&'static str]) -> Self {
        Self {
            required: names.to_vec(),
            optional: Vec::new(),
        }
    }

    pub fn with_optional(mut self, names: &[&'static str]) -> Self {
        self.optional.extend_from_slice(names);
        self
    }

    fn declares(&self, name: &str) -> bool {
        self.required
            .iter()
            .chain(self.optional.iter())
            .any(|declared| *declared == name)
    }

    /// Checks that the call names only declared arguments and all required ones.
    pub fn check(&self, args: &ArgumentMap) -> Result<(), DriverError> {
        if let Some(extra) = args.names().find(|name| !self.declares(name)) {
            return Err(DriverError::UnexpectedArgument(extra.to_string()));
        }
        if let Some(missing) = self.required.iter().find(|name| !args.contains(name)) {
            return Err(DriverError::MissingArgument(missing.to_string()));
        }
        Ok(())
    }
}

type OperationFn<D> = Box<dyn Fn(&mut D, &ArgumentMap) -> Result<Reply, DriverError> + Send + Sync>;

/// A registered operation.
pub struct Operation<D> {
    signature: Signature,
    handler: OperationFn<D>,
}

impl<D> Operation<D> {
    /// Validates the arguments, then runs the handler.
    pub fn call(&self, driver: &mut D, args: &ArgumentMap) -> Result<Reply, DriverError> {
        self.signature.check(args)?;
        (self.handler)(driver, args)
    }
}

/// Canonical operation names mapped to their handlers.
pub struct OperationTable<D> {
    operations: HashMap<String, Operation<D>>,
}

impl<D> OperationTable<D> {
    pub fn new() -> Self {
        Self {
            operations: HashMap::new(),
        }
    }

    /// Registers an operation under the canonical form of `name`.
    pub fn register<F>(&mut self, name: &str, signature: Signature, handler: F) -> &mut Self
    where
        F: Fn(&mut D, &ArgumentMap) -> Result<Reply, DriverError> + Send + Sync + 'static,
    {
        self.operations.insert(
            canonical_operation_name(name),
            Operation {
                signature,
                handler: Box::new(handler),
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&Operation<D>> {
        self.operations.get(name)
    }

    /// Returns operation names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl<D> Default for OperationTable<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased driver instance paired with its operation table.
trait BoundDriver: Send {
    fn invoke(&mut self, operation: &str, args: &ArgumentMap) -> Result<Reply, DriverError>;
    fn operation_names(&self) -> Vec<String>;
}

struct Bound<D> {
    driver: D,
    table: Arc<OperationTable<D>>,
}

impl<D: Driver> BoundDriver for Bound<D> {
    fn invoke(&mut self, operation: &str, args: &ArgumentMap) -> Result<Reply, DriverError> {
        let op = self
            .table
            .get(operation)
            .ok_or_else(|| DriverError::UnknownOperation(operation.to_string()))?;
        op.call(&mut self.driver, args)
    }

    fn operation_names(&self) -> Vec<String> {
        self.table.names().into_iter().map(str::to_string).collect()
    }
}

/// A loaded driver, owned by exactly one session.
pub struct DriverHandle {
    name: String,
    inner: Box<dyn BoundDriver>,
}

impl DriverHandle {
    /// Binds a driver instance to a shared operation table.
    pub fn new<D: Driver>(name: impl Into<String>, driver: D, table: Arc<OperationTable<D>>) -> Self {
        Self {
            name: name.into(),
            inner: Box::new(Bound { driver, table }),
        }
    }

    /// Binds a driver instance, building its operation table on the spot.
    pub fn from_driver<D: Driver>(name: impl Into<String>, driver: D) -> Self {
        Self::new(name, driver, Arc::new(D::operations()))
    }

    /// Name the driver was loaded under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operation_names(&self) -> Vec<String> {
        self.inner.operation_names()
    }

    /// Runs the operation registered under an already-canonical name.
    pub(crate) fn invoke(
        &mut self,
        operation: &str,
        args: &ArgumentMap,
    ) -> Result<Reply, DriverError> {
        self.inner.invoke(operation, args)
    }
}

impl fmt::Debug for DriverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
