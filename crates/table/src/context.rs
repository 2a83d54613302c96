use crate::column::{ColumnInfo, DefaultValue};
use crate::datum::{Datum, Timestamp};
use crate::Result;
use tabula_kv::{MemTxn, Transaction};

/// Evaluates the expressions a table needs while writing rows.
pub trait Evaluator {
    /// The value of `CURRENT_TIMESTAMP`.
    fn current_timestamp(&self) -> Result<Datum>;

    /// Evaluates the default of `col`, cast to its type, or `None` if it has none.
    fn eval_default(&self, col: &ColumnInfo) -> Result<Option<Datum>> {
        let value = match &col.default_value {
            None => return Ok(None),
            Some(DefaultValue::Literal(d)) => d.clone(),
            Some(DefaultValue::CurrentTimestamp) => self.current_timestamp()?,
        };
        self.cast(&value, col).map(Some)
    }

    /// Casts `value` to the storage type of `col`.
    fn cast(&self, value: &Datum, col: &ColumnInfo) -> Result<Datum> {
        value.convert_to(&col.field_type)
    }
}

/// An [`Evaluator`] reading the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEvaluator;

impl Evaluator for SystemEvaluator {
    fn current_timestamp(&self) -> Result<Datum> {
        Ok(Datum::Time(Timestamp::now()))
    }
}

/// The session a table operation runs in.
pub trait Context {
    fn txn(&mut self) -> &mut dyn Transaction;

    fn evaluator(&self) -> &dyn Evaluator;

    /// Records rows changed by the current statement.
    fn add_affected_rows(&mut self, rows: u64);
}

/// A [`Context`] owning a [`MemTxn`].
pub struct SimpleContext<E = SystemEvaluator> {
    txn: MemTxn,
    evaluator: E,
    affected_rows: u64,
}

impl SimpleContext {
    pub fn new(txn: MemTxn) -> Self {
        Self::with_evaluator(txn, SystemEvaluator)
    }
}

impl<E: Evaluator> SimpleContext<E> {
    pub fn with_evaluator(txn: MemTxn, evaluator: E) -> Self {
        Self {
            txn,
            evaluator,
            affected_rows: 0,
        }
    }

    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    pub fn commit(self) -> tabula_kv::Result<()> {
        self.txn.commit()
    }
}

impl<E: Evaluator> Context for SimpleContext<E> {
    fn txn(&mut self) -> &mut dyn Transaction {
        &mut self.txn
    }

    fn evaluator(&self) -> &dyn Evaluator {
        &self.evaluator
    }

    fn add_affected_rows(&mut self, rows: u64) {
        self.affected_rows += rows;
    }
}
