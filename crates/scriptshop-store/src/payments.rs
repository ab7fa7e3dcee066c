use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use scriptshop_shared::PaymentStatus;

use crate::convert::{parsed_at, ts, ts_at, uuid_at};
use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::{NewPayment, Payment};

const PAYMENT_COLUMNS: &str = "id, user_id, item_id, amount, currency, status, order_id, \
     payment_url, deposit_address, created_at, updated_at";

impl Database {
    /// Record a new `pending` payment.
    pub fn create_payment(&self, new: &NewPayment) -> Result<Payment> {
        let id = Uuid::new_v4();
        let now = ts(&Utc::now());
        self.conn().execute(
            "INSERT INTO payments (id, user_id, item_id, amount, currency, status, order_id,
                                   payment_url, deposit_address, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7, ?8, ?9, ?9)",
            params![
                id.to_string(),
                new.user_id.to_string(),
                new.item_id.to_string(),
                new.amount,
                new.currency,
                new.order_id,
                new.payment_url,
                new.deposit_address,
                now,
            ],
        )?;
        tracing::info!(payment = %id, order_id = %new.order_id, "payment recorded");
        self.get_payment(id)
    }

    pub fn get_payment(&self, id: Uuid) -> Result<Payment> {
        self.conn()
            .query_row(
                &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1"),
                params![id.to_string()],
                row_to_payment,
            )
            .map_err(not_found)
    }

    /// Whether `user_id` holds at least one completed payment for `item_id`.
    pub fn has_completed_payment(&self, user_id: Uuid, item_id: Uuid) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM payments
                 WHERE user_id = ?1 AND item_id = ?2 AND status = 'completed'
                 LIMIT 1",
                params![user_id.to_string(), item_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Most recent payment row for the pair, whatever its status.
    pub fn latest_payment(&self, user_id: Uuid, item_id: Uuid) -> Result<Option<Payment>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {PAYMENT_COLUMNS} FROM payments
                     WHERE user_id = ?1 AND item_id = ?2
                     ORDER BY created_at DESC LIMIT 1"
                ),
                params![user_id.to_string(), item_id.to_string()],
                row_to_payment,
            )
            .optional()?)
    }

    pub fn list_payments(&self, status: Option<PaymentStatus>) -> Result<Vec<Payment>> {
        let conn = self.conn();
        let payments = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {PAYMENT_COLUMNS} FROM payments WHERE status = ?1
                     ORDER BY created_at DESC"
                ))?;
                let rows = stmt.query_map(params![status.as_str()], row_to_payment)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {PAYMENT_COLUMNS} FROM payments ORDER BY created_at DESC"
                ))?;
                let rows = stmt.query_map([], row_to_payment)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(payments)
    }

    /// Move a payment to `status`. A completed payment is final.
    pub fn set_payment_status(&self, id: Uuid, status: PaymentStatus) -> Result<Payment> {
        let current = self.get_payment(id)?;
        if current.status == status {
            return Ok(current);
        }
        if current.status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }

        self.conn().execute(
            "UPDATE payments SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), ts(&Utc::now()), id.to_string()],
        )?;
        tracing::info!(payment = %id, from = %current.status, to = %status, "payment status changed");
        self.get_payment(id)
    }
}

fn row_to_payment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        item_id: uuid_at(row, 2)?,
        amount: row.get(3)?,
        currency: row.get(4)?,
        status: parsed_at(row, 5)?,
        order_id: row.get(6)?,
        payment_url: row.get(7)?,
        deposit_address: row.get(8)?,
        created_at: ts_at(row, 9)?,
        updated_at: ts_at(row, 10)?,
    })
}
