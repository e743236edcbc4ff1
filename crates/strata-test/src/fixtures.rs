use std::sync::Arc;

use strata_common::config::StoreConfig;
use strata_common::error::StoreResult;
use strata_common::types::RowId;
use strata_engine::{Column, ForeignKeyAction, Store, StoreSnapshot, TableRef};

/// A customer, keyed by `id`.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct Customer {
    /// Primary key.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// City, range indexed.
    pub city: String,
}

/// An order placed by a customer.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct Order {
    /// Primary key.
    pub id: u64,
    /// References `Customer::id`; 0 means unassigned.
    pub customer: u32,
    /// Amount in cents, range indexed.
    pub amount: i64,
}

impl Customer {
    /// Builds a customer.
    pub fn new(id: u32, name: &str, city: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            city: city.to_string(),
        }
    }
}

impl Order {
    /// Builds an order.
    pub fn new(id: u64, customer: u32, amount: i64) -> Self {
        Self { id, customer, amount }
    }
}

/// `Customer::id`.
pub fn customer_id() -> Column<Customer, u32> {
    Column::new("Id", 0, |c: &Customer| c.id, |c, v| c.id = v)
}

/// `Customer::name`.
pub fn customer_name() -> Column<Customer, String> {
    Column::new("Name", 1, |c: &Customer| c.name.clone(), |c, v| c.name = v)
}

/// `Customer::city`.
pub fn customer_city() -> Column<Customer, String> {
    Column::new("City", 2, |c: &Customer| c.city.clone(), |c, v| c.city = v)
}

/// `Order::id`.
pub fn order_id() -> Column<Order, u64> {
    Column::new("Id", 0, |o: &Order| o.id, |o, v| o.id = v)
}

/// `Order::customer`.
pub fn order_customer() -> Column<Order, u32> {
    Column::new("Customer", 1, |o: &Order| o.customer, |o, v| o.customer = v)
}

/// `Order::amount`.
pub fn order_amount() -> Column<Order, i64> {
    Column::new("Amount", 2, |o: &Order| o.amount, |o, v| o.amount = v)
}

/// A frozen store holding the customer/order schema.
pub struct Shop {
    /// The store.
    pub store: Arc<Store>,
    /// Customer table.
    pub customers: TableRef<Customer>,
    /// Order table.
    pub orders: TableRef<Order>,
}

impl Shop {
    /// Builds the schema with `action` on the order to customer key.
    pub fn new(action: ForeignKeyAction) -> StoreResult<Self> {
        Self::with_config(StoreConfig::for_testing(), action)
    }

    /// Builds the schema with an explicit configuration.
    pub fn with_config(config: StoreConfig, action: ForeignKeyAction) -> StoreResult<Self> {
        let mut store = Store::new(config)?;
        let customers = store.create_table::<Customer>("Customer")?;
        let orders = store.create_table::<Order>("Order")?;
        store.make_primary_key(customers, customer_id())?;
        store.create_index(customers, customer_city())?;
        store.make_primary_key(orders, order_id())?;
        store.create_index(orders, order_amount())?;
        store.create_foreign_key(orders, order_customer(), customers, action, true)?;
        store.freeze();
        Ok(Self {
            store: Arc::new(store),
            customers,
            orders,
        })
    }

    /// A new view at the latest version.
    pub fn view(&self) -> StoreResult<StoreSnapshot> {
        self.store.snapshot()
    }

    /// Inserts customers in one committed transaction.
    pub fn add_customers(&self, view: &StoreSnapshot, customers: &[Customer]) -> StoreResult<Vec<RowId>> {
        view.start_transaction()?;
        let table = view.table(self.customers)?;
        let rows = customers
            .iter()
            .map(|c| table.insert(c.clone()))
            .collect::<StoreResult<Vec<_>>>();
        finish(view, rows)
    }

    /// Inserts orders in one committed transaction.
    pub fn add_orders(&self, view: &StoreSnapshot, orders: &[Order]) -> StoreResult<Vec<RowId>> {
        view.start_transaction()?;
        let table = view.table(self.orders)?;
        let rows = orders
            .iter()
            .map(|o| table.insert(o.clone()))
            .collect::<StoreResult<Vec<_>>>();
        finish(view, rows)
    }
}

/// Commits on success, rolls back on failure.
fn finish<T>(view: &StoreSnapshot, result: StoreResult<T>) -> StoreResult<T> {
    match result {
        Ok(value) => {
            if let Err(e) = view.commit() {
                view.rollback()?;
                return Err(e);
            }
            Ok(value)
        }
        Err(e) => {
            view.rollback()?;
            Err(e)
        }
    }
}
