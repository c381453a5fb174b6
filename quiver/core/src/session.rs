use std::collections::HashMap;
use std::sync::Arc;

use quiver_common::value::PropertyValue;
use quiver_execution::QueryResults;
use quiver_planner::ast;
use quiver_transaction::Transaction;

use crate::database::Database;
use crate::error::{DatabaseError, DatabaseResult};

/// A client session: runs queries either in one-shot transactions or in an
/// explicitly begun one. A failed query leaves the session without an open
/// transaction (the database aborted it).
pub struct Session {
    database: Arc<Database>,
    txn: Option<Transaction>,
}

impl Session {
    pub fn new(database: Arc<Database>) -> Self {
        Self {
            database,
            txn: None,
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    pub fn begin(&mut self) -> DatabaseResult<()> {
        if self.txn.is_none() {
            self.txn = Some(self.database.begin()?);
        }
        Ok(())
    }

    pub fn commit(&mut self) -> DatabaseResult<()> {
        if let Some(txn) = self.txn.take() {
            self.database.commit(&txn)?;
        }
        Ok(())
    }

    pub fn rollback(&mut self) -> DatabaseResult<()> {
        if let Some(txn) = self.txn.take() {
            self.database.abort(&txn)?;
        }
        Ok(())
    }

    /// Runs a query: inside the open transaction when one exists,
    /// otherwise autocommitted.
    pub fn run(
        &mut self,
        query: &ast::Query,
        parameters: HashMap<String, PropertyValue>,
    ) -> DatabaseResult<QueryResults> {
        match &self.txn {
            Some(txn) => {
                let txn = txn.clone();
                match self.database.execute(&txn, query, parameters) {
                    Ok(results) => Ok(results),
                    Err(e) => {
                        // The database already aborted; drop our handle.
                        self.txn = None;
                        Err(e)
                    }
                }
            }
            None => self.database.run(query, parameters),
        }
    }

    /// The (code, message) pair sent to clients for an error.
    pub fn client_error(error: &DatabaseError) -> (&'static str, String) {
        (error.code(), error.to_string())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.rollback();
    }
}
