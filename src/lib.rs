//! stock_data crate: merged key registry and table storage for stock series

mod cache;
pub mod error;
pub mod interval;
pub mod keys;
pub mod registry;
pub mod table;

pub use error::TableError;
pub use interval::{estimate_interval, IntervalEstimate, IntervalUnit};
pub use keys::{KeyItem, KeyedNode};
pub use registry::{Boundaries, IntervalStat, Registry, RegistryIterator, Selection};
pub use table::{
    KeyInput, RawRow, RowStorage, SearchMode, Table, TableOptions, TableRow, TableSelection,
};
