//! SQLite-backed store. Survives restarts.
//!
//! One connection behind a `std::sync::Mutex`, held for a single statement
//! or transaction and never across an `.await`. Status columns are the
//! compare-and-swap target: every transition is an
//! `UPDATE ... WHERE status = ?` and the affected row count decides.

use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use uuid::Uuid;

use super::{attempt_move_is_legal, AttemptTransition, Catalog, OrderStore};
use crate::catalog::{CartLine, Product};
use crate::error::StorefrontError;
use crate::order::{
    AttemptStatus, CartSnapshot, Currency, LineItem, Order, OrderStatus, PaymentAttempt,
};
use crate::unix_now;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS products (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        price INTEGER NOT NULL CHECK (price >= 0),
        currency TEXT NOT NULL,
        stock INTEGER NOT NULL CHECK (stock >= 0),
        active INTEGER NOT NULL DEFAULT 1
    );
    CREATE TABLE IF NOT EXISTS cart_items (
        user_id TEXT NOT NULL,
        product_id TEXT NOT NULL,
        quantity INTEGER NOT NULL CHECK (quantity > 0),
        PRIMARY KEY (user_id, product_id)
    );
    CREATE TABLE IF NOT EXISTS orders (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        currency TEXT NOT NULL,
        total INTEGER NOT NULL CHECK (total >= 0),
        status TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id, created_at);
    CREATE TABLE IF NOT EXISTS order_items (
        order_id TEXT NOT NULL REFERENCES orders(id),
        position INTEGER NOT NULL,
        product_id TEXT NOT NULL,
        quantity INTEGER NOT NULL CHECK (quantity > 0),
        unit_price INTEGER NOT NULL CHECK (unit_price >= 0),
        PRIMARY KEY (order_id, position)
    );
    CREATE TABLE IF NOT EXISTS payment_attempts (
        id TEXT PRIMARY KEY,
        order_id TEXT NOT NULL REFERENCES orders(id),
        provider_reference TEXT,
        redirect_url TEXT,
        amount INTEGER NOT NULL CHECK (amount >= 0),
        status TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_attempts_one_active
        ON payment_attempts(order_id) WHERE status = 'ACTIVE';
    CREATE INDEX IF NOT EXISTS idx_attempts_status_created
        ON payment_attempts(status, created_at);
    PRAGMA journal_mode=WAL;
    PRAGMA foreign_keys=ON;
";

const ORDER_COLUMNS: &str = "id, user_id, currency, total, status, created_at, updated_at";
const ATTEMPT_COLUMNS: &str =
    "id, order_id, provider_reference, redirect_url, amount, status, created_at, updated_at";

/// Orders, attempts, products and carts in one SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// On Unix the file is restricted to 0600.
    pub fn open(path: &str) -> Result<Self, StorefrontError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) =
                std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            {
                tracing::warn!(
                    path = %path,
                    error = %e,
                    "failed to set database file permissions to 0600"
                );
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(c) => c,
            Err(poisoned) => {
                tracing::error!("storefront database mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

fn amount_to_sql(value: u64) -> Result<i64, StorefrontError> {
    i64::try_from(value).map_err(|_| StorefrontError::AmountOverflow)
}

fn amount_from_sql(value: i64) -> Result<u64, StorefrontError> {
    u64::try_from(value)
        .map_err(|_| StorefrontError::Storage(format!("negative amount {value} in database")))
}

fn parse_uuid(value: &str) -> Result<Uuid, StorefrontError> {
    Uuid::parse_str(value)
        .map_err(|e| StorefrontError::Storage(format!("malformed id '{value}': {e}")))
}

fn parse_currency(value: &str) -> Result<Currency, StorefrontError> {
    Currency::new(value)
        .map_err(|_| StorefrontError::Storage(format!("malformed currency '{value}'")))
}

type OrderRow = (String, String, String, i64, String, i64, i64);
type AttemptRow = (
    String,
    String,
    Option<String>,
    Option<String>,
    i64,
    String,
    i64,
    i64,
);
type ProductRow = (String, String, i64, String, u32, bool);

fn order_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OrderRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn attempt_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttemptRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn product_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProductRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn attempt_from_row(row: AttemptRow) -> Result<PaymentAttempt, StorefrontError> {
    let (id, order_id, provider_reference, redirect_url, amount, status, created_at, updated_at) =
        row;
    Ok(PaymentAttempt {
        id: parse_uuid(&id)?,
        order_id: parse_uuid(&order_id)?,
        provider_reference,
        redirect_url,
        amount: amount_from_sql(amount)?,
        status: status.parse()?,
        created_at,
        updated_at,
    })
}

fn product_from_row(row: ProductRow) -> Result<Product, StorefrontError> {
    let (id, name, price, currency, stock, active) = row;
    Ok(Product {
        id,
        name,
        price: amount_from_sql(price)?,
        currency: parse_currency(&currency)?,
        stock,
        active,
    })
}

fn load_items(conn: &Connection, order_id: &str) -> Result<Vec<LineItem>, StorefrontError> {
    let mut stmt = conn.prepare(
        "SELECT product_id, quantity, unit_price FROM order_items
         WHERE order_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map([order_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, u32>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;
    rows.map(|r| -> Result<LineItem, StorefrontError> {
        let (product_id, quantity, unit_price) = r?;
        Ok(LineItem {
            product_id,
            quantity,
            unit_price: amount_from_sql(unit_price)?,
        })
    })
    .collect()
}

fn order_from_row(conn: &Connection, row: OrderRow) -> Result<Order, StorefrontError> {
    let (id, user_id, currency, total, status, created_at, updated_at) = row;
    let items = load_items(conn, &id)?;
    Ok(Order {
        id: parse_uuid(&id)?,
        user_id,
        items,
        currency: parse_currency(&currency)?,
        total: amount_from_sql(total)?,
        status: status.parse()?,
        created_at,
        updated_at,
    })
}

fn current_status(
    conn: &Connection,
    order_id: Uuid,
) -> Result<Option<OrderStatus>, StorefrontError> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM orders WHERE id = ?1",
            [order_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    status.map(|s| s.parse()).transpose()
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl OrderStore for SqliteStore {
    fn create_order(
        &self,
        user_id: &str,
        snapshot: CartSnapshot,
    ) -> Result<Order, StorefrontError> {
        let order = Order::pending(user_id, snapshot, unix_now());
        let id = order.id.to_string();

        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO orders (id, user_id, currency, total, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                order.user_id,
                order.currency.as_str(),
                amount_to_sql(order.total)?,
                order.status.as_str(),
                order.created_at,
                order.updated_at
            ],
        )?;
        for (position, item) in order.items.iter().enumerate() {
            tx.execute(
                "INSERT INTO order_items (order_id, position, product_id, quantity, unit_price)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    position as i64,
                    item.product_id,
                    item.quantity,
                    amount_to_sql(item.unit_price)?
                ],
            )?;
        }
        tx.commit()?;
        Ok(order)
    }

    fn update_status(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, StorefrontError> {
        let conn = self.lock();
        if current_status(&conn, order_id)?.is_none() {
            return Err(StorefrontError::OrderNotFound(order_id));
        }
        if !from.can_transition_to(to) {
            return Ok(false);
        }
        let changed = conn.execute(
            "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![to.as_str(), unix_now(), order_id.to_string(), from.as_str()],
        )?;
        Ok(changed == 1)
    }

    fn get_by_id(&self, order_id: Uuid) -> Result<Order, StorefrontError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
                [order_id.to_string()],
                order_row,
            )
            .optional()?
            .ok_or(StorefrontError::OrderNotFound(order_id))?;
        order_from_row(&conn, row)
    }

    fn list_by_user(&self, user_id: &str) -> Result<Vec<Order>, StorefrontError> {
        let conn = self.lock();
        let rows: Vec<OrderRow> = {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let mapped = stmt.query_map([user_id], order_row)?;
            let rows = mapped.collect::<Result<Vec<_>, _>>()?;
            rows
        };
        rows.into_iter()
            .map(|row| order_from_row(&conn, row))
            .collect()
    }

    fn begin_payment(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        attempt: &PaymentAttempt,
    ) -> Result<bool, StorefrontError> {
        if attempt.status != AttemptStatus::Active || attempt.order_id != order_id {
            return Err(StorefrontError::Validation(
                "only an ACTIVE attempt of this order can begin a payment".to_string(),
            ));
        }

        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if current_status(&tx, order_id)?.is_none() {
            return Err(StorefrontError::OrderNotFound(order_id));
        }
        if !from.can_transition_to(OrderStatus::AwaitingPayment) {
            return Ok(false);
        }

        let changed = tx.execute(
            "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![
                OrderStatus::AwaitingPayment.as_str(),
                unix_now(),
                order_id.to_string(),
                from.as_str()
            ],
        )?;
        if changed == 0 {
            return Ok(false);
        }

        let inserted = tx.execute(
            &format!(
                "INSERT INTO payment_attempts ({ATTEMPT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ),
            params![
                attempt.id.to_string(),
                order_id.to_string(),
                attempt.provider_reference,
                attempt.redirect_url,
                amount_to_sql(attempt.amount)?,
                attempt.status.as_str(),
                attempt.created_at,
                attempt.updated_at
            ],
        );
        match inserted {
            Ok(_) => {}
            // Another ACTIVE attempt already exists; dropping `tx` rolls back.
            Err(e) if is_constraint_violation(&e) => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        tx.commit()?;
        Ok(true)
    }

    fn transition(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        attempt: Option<&AttemptTransition>,
    ) -> Result<bool, StorefrontError> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if current_status(&tx, order_id)?.is_none() {
            return Err(StorefrontError::OrderNotFound(order_id));
        }
        if !from.can_transition_to(to) || attempt.is_some_and(|t| !attempt_move_is_legal(t)) {
            return Ok(false);
        }

        let now = unix_now();
        let changed = tx.execute(
            "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![to.as_str(), now, order_id.to_string(), from.as_str()],
        )?;
        if changed == 0 {
            return Ok(false);
        }

        if let Some(t) = attempt {
            let changed = tx.execute(
                "UPDATE payment_attempts
                 SET status = ?1, updated_at = ?2,
                     provider_reference = COALESCE(?3, provider_reference)
                 WHERE id = ?4 AND order_id = ?5 AND status = ?6",
                params![
                    t.to.as_str(),
                    now,
                    t.provider_reference,
                    t.attempt_id.to_string(),
                    order_id.to_string(),
                    t.from.as_str()
                ],
            )?;
            if changed == 0 {
                return Ok(false);
            }
        }

        tx.commit()?;
        Ok(true)
    }

    fn get_attempt(&self, attempt_id: Uuid) -> Result<Option<PaymentAttempt>, StorefrontError> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {ATTEMPT_COLUMNS} FROM payment_attempts WHERE id = ?1"),
            [attempt_id.to_string()],
            attempt_row,
        )
        .optional()?
        .map(attempt_from_row)
        .transpose()
    }

    fn active_attempt(&self, order_id: Uuid) -> Result<Option<PaymentAttempt>, StorefrontError> {
        let conn = self.lock();
        conn.query_row(
            &format!(
                "SELECT {ATTEMPT_COLUMNS} FROM payment_attempts
                 WHERE order_id = ?1 AND status = 'ACTIVE'"
            ),
            [order_id.to_string()],
            attempt_row,
        )
        .optional()?
        .map(attempt_from_row)
        .transpose()
    }

    fn attempts_for_order(&self, order_id: Uuid) -> Result<Vec<PaymentAttempt>, StorefrontError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM payment_attempts
             WHERE order_id = ?1 ORDER BY created_at, rowid"
        ))?;
        let rows = stmt.query_map([order_id.to_string()], attempt_row)?;
        rows.map(|r| attempt_from_row(r?)).collect()
    }

    fn stale_active_attempts(&self, cutoff: i64) -> Result<Vec<PaymentAttempt>, StorefrontError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT a.id, a.order_id, a.provider_reference, a.redirect_url, a.amount,
                    a.status, a.created_at, a.updated_at
             FROM payment_attempts a JOIN orders o ON o.id = a.order_id
             WHERE a.status = 'ACTIVE' AND a.created_at < ?1
               AND o.status = 'AWAITING_PAYMENT'
             ORDER BY a.created_at",
        )?;
        let rows = stmt.query_map([cutoff], attempt_row)?;
        rows.map(|r| attempt_from_row(r?)).collect()
    }

    fn ping(&self) -> Result<(), StorefrontError> {
        let conn = self.lock();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

impl Catalog for SqliteStore {
    fn product(&self, product_id: &str) -> Result<Option<Product>, StorefrontError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, name, price, currency, stock, active FROM products WHERE id = ?1",
            [product_id],
            product_row,
        )
        .optional()?
        .map(product_from_row)
        .transpose()
    }

    fn list_products(&self) -> Result<Vec<Product>, StorefrontError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, price, currency, stock, active FROM products
             WHERE active = 1 ORDER BY id",
        )?;
        let rows = stmt.query_map([], product_row)?;
        rows.map(|r| product_from_row(r?)).collect()
    }

    fn upsert_product(&self, product: &Product) -> Result<(), StorefrontError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO products (id, name, price, currency, stock, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name, price = excluded.price, currency = excluded.currency,
                stock = excluded.stock, active = excluded.active",
            params![
                product.id,
                product.name,
                amount_to_sql(product.price)?,
                product.currency.as_str(),
                product.stock,
                product.active
            ],
        )?;
        Ok(())
    }

    fn cart_lines(&self, user_id: &str) -> Result<Vec<CartLine>, StorefrontError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT product_id, quantity FROM cart_items WHERE user_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map([user_id], |row| {
            Ok(CartLine {
                product_id: row.get(0)?,
                quantity: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn set_cart_line(
        &self,
        user_id: &str,
        product_id: &str,
        quantity: u32,
    ) -> Result<(), StorefrontError> {
        let conn = self.lock();
        if quantity == 0 {
            conn.execute(
                "DELETE FROM cart_items WHERE user_id = ?1 AND product_id = ?2",
                params![user_id, product_id],
            )?;
            return Ok(());
        }
        conn.execute(
            "INSERT INTO cart_items (user_id, product_id, quantity) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, product_id) DO UPDATE SET quantity = excluded.quantity",
            params![user_id, product_id, quantity],
        )?;
        Ok(())
    }

    fn remove_cart_line(&self, user_id: &str, product_id: &str) -> Result<bool, StorefrontError> {
        let conn = self.lock();
        let removed = conn.execute(
            "DELETE FROM cart_items WHERE user_id = ?1 AND product_id = ?2",
            params![user_id, product_id],
        )?;
        Ok(removed > 0)
    }

    fn clear_cart(&self, user_id: &str) -> Result<(), StorefrontError> {
        let conn = self.lock();
        conn.execute("DELETE FROM cart_items WHERE user_id = ?1", [user_id])?;
        Ok(())
    }

    fn remove_ordered_lines(
        &self,
        user_id: &str,
        lines: &[CartLine],
    ) -> Result<usize, StorefrontError> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut removed = 0;
        for line in lines {
            removed += tx.execute(
                "DELETE FROM cart_items WHERE user_id = ?1 AND product_id = ?2 AND quantity = ?3",
                params![user_id, line.product_id, line.quantity],
            )?;
        }
        tx.commit()?;
        Ok(removed)
    }
}
