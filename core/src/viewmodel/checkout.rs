use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use uuid::Uuid;

use crate::client::parse_data;
use crate::error::ApiError;
use crate::gateway::Gateway;
use crate::http::HttpResponse;
use crate::scope::TaskScope;
use crate::slot::{LoadMode, StateSlot};
use crate::transport::Transport;
use crate::types::{CreateOrder, Order, OrderLine, Product};

pub const EMPTY_CART: &str = "cart is empty";

#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    pub product: Product,
    pub quantity: u32,
}

impl CartLine {
    pub fn subtotal(&self) -> f64 {
        self.product.price * f64::from(self.quantity)
    }
}

/// Local shopping cart. Lines keep the order products were first added in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Add `quantity` units, merging with an existing line for the product.
    pub fn add(&mut self, product: &Product, quantity: u32) {
        if quantity == 0 {
            return;
        }
        match self.position(product.id) {
            Some(index) => {
                let line = &mut self.lines[index];
                line.quantity = line.quantity.saturating_add(quantity);
                line.product = product.clone();
            }
            None => self.lines.push(CartLine {
                product: product.clone(),
                quantity,
            }),
        }
    }

    /// Set a line's quantity; zero removes it. Unknown products are ignored.
    pub fn set_quantity(&mut self, product_id: Uuid, quantity: u32) {
        if quantity == 0 {
            self.remove(product_id);
        } else if let Some(index) = self.position(product_id) {
            self.lines[index].quantity = quantity;
        }
    }

    pub fn remove(&mut self, product_id: Uuid) {
        self.lines.retain(|line| line.product.id != product_id);
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }

    /// Sum of line subtotals, rounded to cents.
    pub fn total(&self) -> f64 {
        let total: f64 = self.lines.iter().map(CartLine::subtotal).sum();
        (total * 100.0).round() / 100.0
    }

    pub fn to_order(&self) -> Result<CreateOrder, ApiError> {
        if self.is_empty() {
            return Err(ApiError::InvalidInput(EMPTY_CART.to_string()));
        }
        Ok(CreateOrder {
            lines: self
                .lines
                .iter()
                .map(|line| OrderLine {
                    product_id: line.product.id,
                    quantity: line.quantity,
                })
                .collect(),
        })
    }

    /// Remove what an accepted order bought. Units added after the order was
    /// sent stay in the cart.
    pub fn settle(&mut self, ordered: &[OrderLine]) {
        for bought in ordered {
            if let Some(index) = self.position(bought.product_id) {
                let line = &mut self.lines[index];
                line.quantity = line.quantity.saturating_sub(bought.quantity);
            }
        }
        self.lines.retain(|line| line.quantity > 0);
    }

    fn position(&self, product_id: Uuid) -> Option<usize> {
        self.lines
            .iter()
            .position(|line| line.product.id == product_id)
    }
}

/// Cart plus checkout and order-history state for the store screens.
pub struct CheckoutViewModel<T> {
    gateway: Arc<Gateway<T>>,
    cart: Arc<Mutex<Cart>>,
    order: Arc<StateSlot<Order>>,
    orders: Arc<StateSlot<Vec<Order>>>,
    scope: Arc<TaskScope>,
}

impl<T: Transport + 'static> CheckoutViewModel<T> {
    pub fn new(gateway: Arc<Gateway<T>>) -> Self {
        Self {
            gateway,
            cart: Arc::new(Mutex::new(Cart::new())),
            order: Arc::new(StateSlot::new("checkout")),
            orders: Arc::new(StateSlot::new("orders")),
            scope: Arc::new(TaskScope::new()),
        }
    }

    pub fn order(&self) -> &StateSlot<Order> {
        &self.order
    }

    pub fn orders(&self) -> &StateSlot<Vec<Order>> {
        &self.orders
    }

    /// Snapshot of the cart.
    pub fn cart(&self) -> Cart {
        lock_cart(&self.cart).clone()
    }

    pub fn edit_cart<R>(&self, edit: impl FnOnce(&mut Cart) -> R) -> R {
        edit(&mut lock_cart(&self.cart))
    }

    pub async fn settled(&self) {
        self.scope.settled().await;
    }

    /// Place an order for the current cart. An empty cart fails locally
    /// without a request; a successful order is removed from the cart and the
    /// order history is refreshed.
    pub fn checkout(&self) {
        let order = lock_cart(&self.cart).to_order();
        let request = order
            .as_ref()
            .map_err(ApiError::clone)
            .and_then(|order| self.gateway.client().build_checkout(order));
        let ticket = self.order.begin(LoadMode::Fresh);

        let gateway = Arc::clone(&self.gateway);
        let slot = Arc::clone(&self.order);
        let cart = Arc::clone(&self.cart);
        let orders = Arc::clone(&self.orders);
        let scope = Arc::downgrade(&self.scope);
        self.scope.spawn(async move {
            let placed = gateway
                .complete(&slot, ticket, request, |response| {
                    settle_cart(&cart, order, response)
                })
                .await;
            if placed.is_ok() {
                spawn_orders_refresh(&gateway, &orders, &scope);
            }
        });
    }

    pub async fn checkout_now(&self) -> Result<Order, ApiError> {
        let order = lock_cart(&self.cart).to_order();
        let request = order
            .as_ref()
            .map_err(ApiError::clone)
            .and_then(|order| self.gateway.client().build_checkout(order));
        let placed = self
            .gateway
            .run(&self.order, LoadMode::Fresh, request, |response| {
                settle_cart(&self.cart, order, response)
            })
            .await;
        if placed.is_ok() {
            spawn_orders_refresh(&self.gateway, &self.orders, &Arc::downgrade(&self.scope));
        }
        placed
    }

    pub fn load_orders(&self) {
        let ticket = self.orders.begin(LoadMode::Fresh);
        let request = Ok(self.gateway.client().build_list_orders());
        let gateway = Arc::clone(&self.gateway);
        let slot = Arc::clone(&self.orders);
        self.scope.spawn(async move {
            let _ = gateway.complete(&slot, ticket, request, parse_orders).await;
        });
    }

    pub async fn load_orders_now(&self) -> Result<Vec<Order>, ApiError> {
        let request = Ok(self.gateway.client().build_list_orders());
        self.gateway
            .run(&self.orders, LoadMode::Fresh, request, parse_orders)
            .await
    }
}

/// Refresh the order history after a placed order, unless the owning view
/// model is gone.
fn spawn_orders_refresh<T: Transport + 'static>(
    gateway: &Arc<Gateway<T>>,
    orders: &Arc<StateSlot<Vec<Order>>>,
    scope: &Weak<TaskScope>,
) {
    let Some(scope) = scope.upgrade() else {
        return;
    };
    let ticket = orders.begin(LoadMode::Refresh);
    let request = Ok(gateway.client().build_list_orders());
    let gateway = Arc::clone(gateway);
    let orders = Arc::clone(orders);
    scope.spawn(async move {
        let _ = gateway.complete(&orders, ticket, request, parse_orders).await;
    });
}

fn settle_cart(
    cart: &Mutex<Cart>,
    sent: Result<CreateOrder, ApiError>,
    response: HttpResponse,
) -> Result<Order, ApiError> {
    let order: Order = parse_data("place order", response)?;
    if let Ok(sent) = sent {
        lock_cart(cart).settle(&sent.lines);
    }
    Ok(order)
}

fn parse_orders(response: HttpResponse) -> Result<Vec<Order>, ApiError> {
    parse_data("list orders", response)
}

fn lock_cart(cart: &Mutex<Cart>) -> MutexGuard<'_, Cart> {
    cart.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::VetCareClient;
    use crate::http::{HttpMethod, HttpRequest};
    use crate::resource::Resource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn product(name: &str, price: f64) -> Product {
        Product {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            price,
            category: "food".to_string(),
            stock: 10,
        }
    }

    #[test]
    fn adding_the_same_product_merges_lines() {
        let kibble = product("Kibble", 12.5);
        let mut cart = Cart::new();
        cart.add(&kibble, 1);
        cart.add(&kibble, 2);
        cart.add(&kibble, 0);

        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.item_count(), 3);
    }

    #[test]
    fn total_is_rounded_to_cents() {
        let mut cart = Cart::new();
        cart.add(&product("Treats", 0.1), 3);
        cart.add(&product("Collar", 9.99), 1);
        assert_eq!(cart.total(), 10.29);
    }

    #[test]
    fn zero_quantity_removes_line() {
        let collar = product("Collar", 9.99);
        let mut cart = Cart::new();
        cart.add(&collar, 2);
        cart.set_quantity(collar.id, 0);
        assert!(cart.is_empty());
    }

    #[test]
    fn empty_cart_cannot_become_an_order() {
        assert_eq!(
            Cart::new().to_order(),
            Err(ApiError::InvalidInput(EMPTY_CART.to_string()))
        );
    }

    #[test]
    fn settle_keeps_units_added_after_sending() {
        let kibble = product("Kibble", 12.5);
        let mut cart = Cart::new();
        cart.add(&kibble, 2);
        let sent = cart.to_order().unwrap();
        cart.add(&kibble, 1);

        cart.settle(&sent.lines);
        assert_eq!(cart.item_count(), 1);
    }

    struct Counting {
        calls: AtomicUsize,
        body: String,
    }

    #[async_trait]
    impl Transport for Counting {
        async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(HttpResponse::new(200, self.body.clone()))
        }
    }

    fn checkout_model(body: String) -> CheckoutViewModel<Counting> {
        let gateway = Gateway::new(
            VetCareClient::new("http://vetcare.test"),
            Counting {
                calls: AtomicUsize::new(0),
                body,
            },
        );
        CheckoutViewModel::new(Arc::new(gateway))
    }

    #[tokio::test]
    async fn empty_cart_fails_without_a_request() {
        let vm = checkout_model(String::new());
        let mut rx = vm.order().transitions();

        vm.checkout();
        vm.settled().await;

        assert!(rx.try_recv().unwrap().is_loading());
        assert_eq!(rx.try_recv().unwrap(), Resource::error(EMPTY_CART));
        assert_eq!(vm.gateway.transport().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_order_keeps_cart() {
        let vm = checkout_model(
            r#"{"success":false,"message":"not enough stock for Kibble"}"#.to_string(),
        );
        vm.edit_cart(|cart| cart.add(&product("Kibble", 12.5), 99));

        let err = vm.checkout_now().await.unwrap_err();
        assert_eq!(err.to_string(), "not enough stock for Kibble");
        assert_eq!(vm.cart().item_count(), 99);
    }

    /// POST places an order; GET lists the order history.
    struct Shop {
        order: String,
        methods: Mutex<Vec<HttpMethod>>,
    }

    #[async_trait]
    impl Transport for Shop {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            self.methods.lock().unwrap().push(request.method);
            let body = match request.method {
                HttpMethod::Post => {
                    format!(r#"{{"success":true,"message":"order placed","data":{}}}"#, self.order)
                }
                _ => format!(r#"{{"success":true,"data":[{}]}}"#, self.order),
            };
            Ok(HttpResponse::new(200, body))
        }
    }

    #[tokio::test]
    async fn placed_order_settles_cart_then_refreshes_history() {
        let kibble = product("Kibble", 12.5);
        let order = format!(
            r#"{{"id":"{}","owner_id":"{}","items":[{{"product_id":"{}","name":"Kibble",
            "unit_price":12.5,"quantity":2}}],"total":25.0,"created_at":"2030-01-01T10:00:00Z"}}"#,
            Uuid::new_v4(),
            Uuid::new_v4(),
            kibble.id
        );
        let gateway = Gateway::new(
            VetCareClient::new("http://vetcare.test"),
            Shop {
                order,
                methods: Mutex::new(Vec::new()),
            },
        );
        let vm = CheckoutViewModel::new(Arc::new(gateway));
        vm.edit_cart(|cart| cart.add(&kibble, 2));
        let mut history = vm.orders().transitions();

        vm.checkout();
        vm.settled().await;

        assert_eq!(vm.order().get().into_data().unwrap().total, 25.0);
        assert!(vm.cart().is_empty());
        assert_eq!(history.try_recv().unwrap(), Resource::Loading(None));
        assert_eq!(history.try_recv().unwrap().into_data().unwrap().len(), 1);
        let methods = vm.gateway.transport().methods.lock().unwrap().clone();
        assert_eq!(methods, vec![HttpMethod::Post, HttpMethod::Get]);
    }

    #[tokio::test]
    async fn checkout_now_refreshes_history_after_returning_order() {
        let kibble = product("Kibble", 12.5);
        let order = format!(
            r#"{{"id":"{}","owner_id":"{}","items":[],"total":12.5,
            "created_at":"2030-01-01T10:00:00Z"}}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        let gateway = Gateway::new(
            VetCareClient::new("http://vetcare.test"),
            Shop {
                order,
                methods: Mutex::new(Vec::new()),
            },
        );
        let vm = CheckoutViewModel::new(Arc::new(gateway));
        vm.edit_cart(|cart| cart.add(&kibble, 1));

        let placed = vm.checkout_now().await.unwrap();
        assert_eq!(placed.total, 12.5);
        assert!(vm.orders().get().is_loading());

        vm.settled().await;
        assert!(vm.orders().get().is_success());
    }
}
