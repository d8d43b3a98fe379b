//! Schema and migration definitions
//!
//! To create a new migration, add a new [`Migration`] object to the `migrations`
//! vec for a particular schema. The `Migration` must specify the forward
//! migration script as well as the schema that results from running it.

use once_cell::sync::Lazy;
use rusqlite::{Connection, Transaction};

use crate::db::DbKind;
use crate::error::{DatabaseError, DatabaseResult};

pub static SCHEMA_DHT: Lazy<Schema> = Lazy::new(|| Schema {
    migrations: vec![M::initial(include_str!("sql/dht/schema/0.sql"))],
});

pub struct Schema {
    migrations: Vec<Migration>,
}

impl Schema {
    /// Determine if any database migrations need to run, and run them if so.
    /// The decision is based on the difference between the number of
    /// migrations and the user_version pragma value in the database itself.
    pub fn initialize(&self, conn: &mut Connection, db_kind: &DbKind) -> DatabaseResult<()> {
        let user_version: u16 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        let migrations_applied = user_version as usize;
        let num_migrations = self.migrations.len();
        match migrations_applied.cmp(&num_migrations) {
            std::cmp::Ordering::Less => {
                let mut txn = conn.transaction()?;
                for v in migrations_applied..num_migrations {
                    self.migrations[v].run_forward(&mut txn)?;
                    // set the DB user_version so that next time we don't run
                    // the same migration
                    txn.pragma_update(None, "user_version", v + 1)?;
                }
                txn.commit()?;
                tracing::info!(
                    "database forward migrated: {} from {} to {}",
                    db_kind,
                    migrations_applied,
                    num_migrations - 1,
                );
            }
            std::cmp::Ordering::Equal => {
                tracing::debug!(
                    "database needed no migration or initialization, good to go: {}",
                    db_kind
                );
            }
            std::cmp::Ordering::Greater => {
                return Err(DatabaseError::SchemaTooNew(
                    db_kind.to_string(),
                    migrations_applied,
                ));
            }
        }

        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Migration {
    _schema: String,
    forward: String,
}

impl Migration {
    /// The initial migration's forward migration is the entire schema
    pub fn initial(schema: &str) -> Self {
        Self {
            _schema: schema.into(),
            forward: schema.into(),
        }
    }

    pub fn run_forward(&self, txn: &mut Transaction) -> rusqlite::Result<()> {
        txn.execute_batch(&self.forward)
    }
}

type M = Migration;
