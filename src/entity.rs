//! Typed entities over records.

use crate::config::EntityMapping;
use crate::record::Record;

/// A typed entity backed by one [`Record`].
///
/// The record is the only state an entity carries; accessors are written on
/// top of [`Record::get_column`] and friends.
pub trait Entity: Sized {
    fn mapping() -> EntityMapping;

    fn from_record(record: Record) -> Self;

    fn record(&self) -> &Record;

    fn record_mut(&mut self) -> &mut Record;

    fn into_record(self) -> Record;
}
