//! Sample order-management domain.
//!
//! - [`Customer`]: standalone entity
//! - [`Product`]: standalone entity referenced by line items
//! - [`Order`]: aggregate root owning its [`LineItem`]s, optionally
//!   referencing a customer
//! - [`LineItem`]: child of an order, optionally referencing a product

use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, LazyLock, Weak};
use uow_core::entity::{with_mut, with_ref};
use uow_core::schema::ValueType;
use uow_core::{
    find_link, share, CoreResult, Entity, EntityKey, EntityLink, EntitySchema, EntityType, SchemaRegistry,
    SharedEntity, Snapshot, VersionMarker,
};

/// Customer entity type.
pub const CUSTOMER: EntityType = EntityType::new("Customer");
/// Product entity type.
pub const PRODUCT: EntityType = EntityType::new("Product");
/// Order entity type.
pub const ORDER: EntityType = EntityType::new("Order");
/// Line item entity type.
pub const LINE_ITEM: EntityType = EntityType::new("LineItem");

/// Customer schema.
pub static CUSTOMER_SCHEMA: LazyLock<EntitySchema> = LazyLock::new(|| {
    EntitySchema::builder("Customer", || share(Customer::default()))
        .value("name", ValueType::Text, true)
        .value("email", ValueType::Text, false)
        .build()
});

/// Product schema.
pub static PRODUCT_SCHEMA: LazyLock<EntitySchema> = LazyLock::new(|| {
    EntitySchema::builder("Product", || share(Product::default()))
        .value("name", ValueType::Text, true)
        .value("price", ValueType::Integer, true)
        .build()
});

/// Order schema.
pub static ORDER_SCHEMA: LazyLock<EntitySchema> = LazyLock::new(|| {
    EntitySchema::builder("Order", || share(Order::default()))
        .value("reference", ValueType::Text, true)
        .parent("customer", "Customer", false)
        .child("lines", "LineItem")
        .build()
});

/// Line item schema.
pub static LINE_ITEM_SCHEMA: LazyLock<EntitySchema> = LazyLock::new(|| {
    EntitySchema::builder("LineItem", || share(LineItem::default()))
        .value("quantity", ValueType::Integer, true)
        .parent("order", "Order", true)
        .parent("product", "Product", false)
        .build()
});

/// Registry holding every schema of the sample domain.
#[must_use]
pub fn schemas() -> SchemaRegistry {
    SchemaRegistry::new()
        .with(&CUSTOMER_SCHEMA)
        .with(&PRODUCT_SCHEMA)
        .with(&ORDER_SCHEMA)
        .with(&LINE_ITEM_SCHEMA)
}

macro_rules! entity_plumbing {
    () => {
        fn key(&self) -> Option<EntityKey> {
            self.key
        }

        fn set_key(&mut self, key: Option<EntityKey>) {
            self.key = key;
        }

        fn version(&self) -> &VersionMarker {
            &self.version
        }

        fn version_mut(&mut self) -> &mut VersionMarker {
            &mut self.version
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    };
}

/// A customer.
#[derive(Debug, Default)]
pub struct Customer {
    /// Persisted key.
    pub key: Option<EntityKey>,
    /// Display name.
    pub name: String,
    /// Contact address.
    pub email: Option<String>,
    /// Version marker.
    pub version: VersionMarker,
}

impl Entity for Customer {
    fn schema(&self) -> &'static EntitySchema {
        &CUSTOMER_SCHEMA
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.key)
            .with("name", self.name.as_str())
            .with("email", self.email.clone())
    }

    fn restore(&mut self, snapshot: &Snapshot) -> CoreResult<()> {
        self.key = snapshot.key();
        self.name = snapshot.text("name")?.to_string();
        self.email = snapshot
            .get("email")
            .and_then(|v| v.as_text())
            .map(str::to_string);
        Ok(())
    }

    entity_plumbing!();
}

/// A product.
#[derive(Debug, Default)]
pub struct Product {
    /// Persisted key.
    pub key: Option<EntityKey>,
    /// Product name.
    pub name: String,
    /// Price in cents.
    pub price: i64,
    /// Version marker.
    pub version: VersionMarker,
}

impl Entity for Product {
    fn schema(&self) -> &'static EntitySchema {
        &PRODUCT_SCHEMA
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.key)
            .with("name", self.name.as_str())
            .with("price", self.price)
    }

    fn restore(&mut self, snapshot: &Snapshot) -> CoreResult<()> {
        self.key = snapshot.key();
        self.name = snapshot.text("name")?.to_string();
        self.price = snapshot.integer("price")?;
        Ok(())
    }

    entity_plumbing!();
}

/// An order: the aggregate root.
#[derive(Default)]
pub struct Order {
    /// Persisted key.
    pub key: Option<EntityKey>,
    /// Order reference.
    pub reference: String,
    /// Ordering customer.
    pub customer: Option<SharedEntity>,
    /// Owned line items.
    pub lines: Vec<SharedEntity>,
    /// Version marker.
    pub version: VersionMarker,
}

impl fmt::Debug for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Order")
            .field("key", &self.key)
            .field("reference", &self.reference)
            .field("lines", &self.lines.len())
            .finish_non_exhaustive()
    }
}

impl Entity for Order {
    fn schema(&self) -> &'static EntitySchema {
        &ORDER_SCHEMA
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.key).with("reference", self.reference.as_str())
    }

    fn restore(&mut self, snapshot: &Snapshot) -> CoreResult<()> {
        self.key = snapshot.key();
        self.reference = snapshot.text("reference")?.to_string();
        Ok(())
    }

    fn parent_links(&self) -> Vec<EntityLink> {
        self.customer
            .iter()
            .map(|c| EntityLink::new("customer", Arc::clone(c)))
            .collect()
    }

    fn relink(&mut self, parents: &[EntityLink]) {
        self.customer = find_link(parents, "customer");
    }

    fn child_links(&self) -> Vec<EntityLink> {
        self.lines
            .iter()
            .map(|l| EntityLink::new("lines", Arc::clone(l)))
            .collect()
    }

    entity_plumbing!();
}

/// One line of an order.
///
/// Holds its order weakly; the order owns the line.
#[derive(Default)]
pub struct LineItem {
    /// Persisted key.
    pub key: Option<EntityKey>,
    /// Ordered quantity.
    pub quantity: i64,
    /// Owning order.
    pub order: Option<Weak<RwLock<dyn Entity>>>,
    /// Ordered product.
    pub product: Option<SharedEntity>,
    /// Version marker.
    pub version: VersionMarker,
}

impl fmt::Debug for LineItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineItem")
            .field("key", &self.key)
            .field("quantity", &self.quantity)
            .finish_non_exhaustive()
    }
}

impl Entity for LineItem {
    fn schema(&self) -> &'static EntitySchema {
        &LINE_ITEM_SCHEMA
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.key).with("quantity", self.quantity)
    }

    fn restore(&mut self, snapshot: &Snapshot) -> CoreResult<()> {
        self.key = snapshot.key();
        self.quantity = snapshot.integer("quantity")?;
        Ok(())
    }

    fn parent_links(&self) -> Vec<EntityLink> {
        let mut links = Vec::new();
        if let Some(order) = self.order.as_ref().and_then(Weak::upgrade) {
            links.push(EntityLink::new("order", order));
        }
        if let Some(product) = &self.product {
            links.push(EntityLink::new("product", Arc::clone(product)));
        }
        links
    }

    fn relink(&mut self, parents: &[EntityLink]) {
        self.order = find_link(parents, "order").map(|o| Arc::downgrade(&o));
        self.product = find_link(parents, "product");
    }

    entity_plumbing!();
}

/// Creates an unsaved customer.
#[must_use]
pub fn customer(name: &str) -> SharedEntity {
    share(Customer {
        name: name.to_string(),
        ..Customer::default()
    })
}

/// Creates an unsaved product.
#[must_use]
pub fn product(name: &str, price: i64) -> SharedEntity {
    share(Product {
        name: name.to_string(),
        price,
        ..Product::default()
    })
}

/// Creates a product that looks loaded from storage under `key`.
#[must_use]
pub fn stored_product(key: i64, name: &str, price: i64) -> SharedEntity {
    share(Product {
        key: Some(EntityKey::new(key)),
        name: name.to_string(),
        price,
        ..Product::default()
    })
}

/// Creates an unsaved order without lines.
#[must_use]
pub fn order(reference: &str) -> SharedEntity {
    share(Order {
        reference: reference.to_string(),
        ..Order::default()
    })
}

/// Appends an unsaved line to `order` and returns it.
///
/// # Panics
///
/// Panics if `order` is not an [`Order`].
pub fn add_line(order: &SharedEntity, quantity: i64, product: Option<&SharedEntity>) -> SharedEntity {
    let line = share(LineItem {
        quantity,
        order: Some(Arc::downgrade(order)),
        product: product.cloned(),
        ..LineItem::default()
    });
    with_mut::<Order, _>(order, |o| o.lines.push(Arc::clone(&line))).expect("not an order");
    line
}

/// Sets the ordering customer.
///
/// # Panics
///
/// Panics if `order` is not an [`Order`].
pub fn set_customer(order: &SharedEntity, customer: &SharedEntity) {
    with_mut::<Order, _>(order, |o| o.customer = Some(Arc::clone(customer))).expect("not an order");
}

/// The ordering customer.
///
/// # Panics
///
/// Panics if `order` is not an [`Order`].
#[must_use]
pub fn customer_of(order: &SharedEntity) -> Option<SharedEntity> {
    with_ref::<Order, _>(order, |o| o.customer.clone()).expect("not an order")
}

/// The product's price.
///
/// # Panics
///
/// Panics if `product` is not a [`Product`].
#[must_use]
pub fn price_of(product: &SharedEntity) -> i64 {
    with_ref::<Product, _>(product, |p| p.price).expect("not a product")
}

/// Changes the product's price.
///
/// # Panics
///
/// Panics if `product` is not a [`Product`].
pub fn set_price(product: &SharedEntity, price: i64) {
    with_mut::<Product, _>(product, |p| p.price = price).expect("not a product");
}

/// The line items of an order.
///
/// # Panics
///
/// Panics if `order` is not an [`Order`].
#[must_use]
pub fn lines_of(order: &SharedEntity) -> Vec<SharedEntity> {
    with_ref::<Order, _>(order, |o| o.lines.clone()).expect("not an order")
}

/// Changes a line's quantity.
///
/// # Panics
///
/// Panics if `line` is not a [`LineItem`].
pub fn set_quantity(line: &SharedEntity, quantity: i64) {
    with_mut::<LineItem, _>(line, |l| l.quantity = quantity).expect("not a line item");
}

/// The entity's key.
#[must_use]
pub fn key_of(entity: &SharedEntity) -> Option<EntityKey> {
    entity.read().key()
}
