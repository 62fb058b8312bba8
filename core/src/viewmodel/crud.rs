use std::sync::{Arc, Weak};

use uuid::Uuid;

use crate::client::{parse_ack, parse_data};
use crate::error::ApiError;
use crate::gateway::Gateway;
use crate::http::{HttpRequest, HttpResponse};
use crate::scope::{SerialGate, TaskScope};
use crate::slot::{LoadMode, StateSlot, Ticket};
use crate::transport::Transport;
use crate::types::{Appointment, AppointmentStatus, Clinic, CrudResource, Pet, Product};

pub type ProductsViewModel<T> = CrudViewModel<Product, T>;
pub type ClinicsViewModel<T> = CrudViewModel<Clinic, T>;
pub type PetsViewModel<T> = CrudViewModel<Pet, T>;
pub type AppointmentsViewModel<T> = CrudViewModel<Appointment, T>;

type SlotOf<R, T, P> = fn(&Shared<R, T>) -> &StateSlot<P>;

struct Shared<R, T> {
    gateway: Arc<Gateway<T>>,
    items: StateSlot<Vec<R>>,
    detail: StateSlot<R>,
    saved: StateSlot<R>,
    deleted: StateSlot<String>,
    gate: SerialGate,
}

impl<R: CrudResource, T: Transport> Shared<R, T> {
    async fn list(&self, ticket: Ticket) -> Result<Vec<R>, ApiError> {
        let request = Ok(self.gateway.client().build_list::<R>());
        self.gateway
            .complete(&self.items, ticket, request, |response| {
                parse_data(R::LABELS.list, response)
            })
            .await
    }
}

/// List, detail and mutation state for one REST collection.
///
/// Fetches on the same slot are last-invocation-wins. Mutations (create,
/// update, delete and the appointment transitions) take turns through a FIFO
/// gate in the order they were triggered, and each successful one refreshes
/// `items`.
pub struct CrudViewModel<R, T> {
    shared: Arc<Shared<R, T>>,
    scope: Arc<TaskScope>,
}

impl<R: CrudResource, T: Transport + 'static> CrudViewModel<R, T> {
    /// A view model whose slots all start `Idle`.
    pub fn new(gateway: Arc<Gateway<T>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                gateway,
                items: StateSlot::new(R::LABELS.list),
                detail: StateSlot::new(R::LABELS.get),
                saved: StateSlot::new(R::LABELS.create),
                deleted: StateSlot::new(R::LABELS.delete),
                gate: SerialGate::new(),
            }),
            scope: Arc::new(TaskScope::new()),
        }
    }

    /// A view model for a screen that loads on entry: `items` is already
    /// `Loading` when this returns.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    pub fn open(gateway: Arc<Gateway<T>>) -> Self {
        let model = Self::new(gateway);
        model.load();
        model
    }

    pub fn gateway(&self) -> &Arc<Gateway<T>> {
        &self.shared.gateway
    }

    pub fn items(&self) -> &StateSlot<Vec<R>> {
        &self.shared.items
    }

    pub fn detail(&self) -> &StateSlot<R> {
        &self.shared.detail
    }

    pub fn saved(&self) -> &StateSlot<R> {
        &self.shared.saved
    }

    pub fn deleted(&self) -> &StateSlot<String> {
        &self.shared.deleted
    }

    /// Wait for every launched operation and follow-up refetch.
    pub async fn settled(&self) {
        self.scope.settled().await;
    }

    // -- fetches -----------------------------------------------------------

    pub fn load(&self) {
        self.spawn_list(LoadMode::Fresh);
    }

    /// Reload while keeping the current list visible.
    pub fn refresh(&self) {
        self.spawn_list(LoadMode::Refresh);
    }

    pub async fn load_now(&self) -> Result<Vec<R>, ApiError> {
        let ticket = self.shared.items.begin(LoadMode::Fresh);
        self.shared.list(ticket).await
    }

    pub async fn refresh_now(&self) -> Result<Vec<R>, ApiError> {
        let ticket = self.shared.items.begin(LoadMode::Refresh);
        self.shared.list(ticket).await
    }

    pub fn select(&self, id: Uuid) {
        let request = Ok(self.shared.gateway.client().build_get::<R>(id));
        self.spawn_fetch(|shared| &shared.detail, request, parse_get::<R>);
    }

    pub async fn select_now(&self, id: Uuid) -> Result<R, ApiError> {
        let request = Ok(self.shared.gateway.client().build_get::<R>(id));
        let ticket = self.shared.detail.begin(LoadMode::Fresh);
        self.shared
            .gateway
            .complete(&self.shared.detail, ticket, request, parse_get::<R>)
            .await
    }

    // -- mutations ---------------------------------------------------------

    pub fn create(&self, input: R::Create) {
        let request = self.shared.gateway.client().build_create::<R>(&input);
        self.spawn_mutation(|shared| &shared.saved, request, parse_create::<R>);
    }

    pub async fn create_now(&self, input: R::Create) -> Result<R, ApiError> {
        let request = self.shared.gateway.client().build_create::<R>(&input);
        self.mutate_now(|shared| &shared.saved, request, parse_create::<R>)
            .await
    }

    pub fn update(&self, id: Uuid, input: R::Update) {
        let request = self.shared.gateway.client().build_update::<R>(id, &input);
        self.spawn_mutation(|shared| &shared.saved, request, parse_update::<R>);
    }

    pub async fn update_now(&self, id: Uuid, input: R::Update) -> Result<R, ApiError> {
        let request = self.shared.gateway.client().build_update::<R>(id, &input);
        self.mutate_now(|shared| &shared.saved, request, parse_update::<R>)
            .await
    }

    pub fn delete(&self, id: Uuid) {
        let request = Ok(self.shared.gateway.client().build_delete::<R>(id));
        self.spawn_mutation(|shared| &shared.deleted, request, parse_delete::<R>);
    }

    pub async fn delete_now(&self, id: Uuid) -> Result<String, ApiError> {
        let request = Ok(self.shared.gateway.client().build_delete::<R>(id));
        self.mutate_now(|shared| &shared.deleted, request, parse_delete::<R>)
            .await
    }

    // -- plumbing ----------------------------------------------------------

    fn spawn_list(&self, mode: LoadMode) {
        let ticket = self.shared.items.begin(mode);
        let shared = Arc::clone(&self.shared);
        self.scope.spawn(async move {
            // The outcome is already published on the slot.
            let _ = shared.list(ticket).await;
        });
    }

    fn spawn_fetch<P, F>(
        &self,
        slot: SlotOf<R, T, P>,
        request: Result<HttpRequest, ApiError>,
        parse: F,
    ) where
        P: Clone + Send + Sync + 'static,
        F: FnOnce(HttpResponse) -> Result<P, ApiError> + Send + 'static,
    {
        let ticket = slot(&self.shared).begin(LoadMode::Fresh);
        let shared = Arc::clone(&self.shared);
        self.scope.spawn(async move {
            let _ = shared
                .gateway
                .complete(slot(&shared), ticket, request, parse)
                .await;
        });
    }

    fn spawn_mutation<P, F>(
        &self,
        slot: SlotOf<R, T, P>,
        request: Result<HttpRequest, ApiError>,
        parse: F,
    ) where
        P: Clone + Send + Sync + 'static,
        F: FnOnce(HttpResponse) -> Result<P, ApiError> + Send + 'static,
    {
        let ticket = slot(&self.shared).begin(LoadMode::Fresh);
        let pass = self.shared.gate.reserve();
        let shared = Arc::clone(&self.shared);
        let scope = Arc::downgrade(&self.scope);
        self.scope.spawn(async move {
            let _turn = pass.enter().await;
            let outcome = shared
                .gateway
                .complete(slot(&shared), ticket, request, parse)
                .await;
            if outcome.is_ok() {
                spawn_refetch(&shared, &scope);
            }
        });
    }

    async fn mutate_now<P, F>(
        &self,
        slot: SlotOf<R, T, P>,
        request: Result<HttpRequest, ApiError>,
        parse: F,
    ) -> Result<P, ApiError>
    where
        P: Clone,
        F: FnOnce(HttpResponse) -> Result<P, ApiError>,
    {
        let ticket = slot(&self.shared).begin(LoadMode::Fresh);
        let _turn = self.shared.gate.reserve().enter().await;
        let outcome = self
            .shared
            .gateway
            .complete(slot(&self.shared), ticket, request, parse)
            .await;
        if outcome.is_ok() {
            spawn_refetch(&self.shared, &Arc::downgrade(&self.scope));
        }
        outcome
    }
}

/// Appointment status transitions; both publish the updated appointment into
/// `saved`.
impl<T: Transport + 'static> CrudViewModel<Appointment, T> {
    pub fn change_status(&self, id: Uuid, status: AppointmentStatus) {
        let request = self.shared.gateway.client().build_change_status(id, status);
        self.spawn_mutation(|shared| &shared.saved, request, parse_status_change);
    }

    pub async fn change_status_now(
        &self,
        id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Appointment, ApiError> {
        let request = self.shared.gateway.client().build_change_status(id, status);
        self.mutate_now(|shared| &shared.saved, request, parse_status_change)
            .await
    }

    pub fn cancel(&self, id: Uuid) {
        let request = Ok(self.shared.gateway.client().build_cancel_appointment(id));
        self.spawn_mutation(|shared| &shared.saved, request, parse_cancel);
    }

    pub async fn cancel_now(&self, id: Uuid) -> Result<Appointment, ApiError> {
        let request = Ok(self.shared.gateway.client().build_cancel_appointment(id));
        self.mutate_now(|shared| &shared.saved, request, parse_cancel)
            .await
    }
}

/// Refresh `items` after a mutation, unless the owning view model is gone.
fn spawn_refetch<R: CrudResource, T: Transport + 'static>(
    shared: &Arc<Shared<R, T>>,
    scope: &Weak<TaskScope>,
) {
    let Some(scope) = scope.upgrade() else {
        return;
    };
    let ticket = shared.items.begin(LoadMode::Refresh);
    let shared = Arc::clone(shared);
    scope.spawn(async move {
        let _ = shared.list(ticket).await;
    });
}

fn parse_get<R: CrudResource>(response: HttpResponse) -> Result<R, ApiError> {
    parse_data(R::LABELS.get, response)
}

fn parse_create<R: CrudResource>(response: HttpResponse) -> Result<R, ApiError> {
    parse_data(R::LABELS.create, response)
}

fn parse_update<R: CrudResource>(response: HttpResponse) -> Result<R, ApiError> {
    parse_data(R::LABELS.update, response)
}

fn parse_delete<R: CrudResource>(response: HttpResponse) -> Result<String, ApiError> {
    parse_ack(R::LABELS.delete, response)
}

fn parse_status_change(response: HttpResponse) -> Result<Appointment, ApiError> {
    parse_data("change appointment status", response)
}

fn parse_cancel(response: HttpResponse) -> Result<Appointment, ApiError> {
    parse_data("cancel appointment", response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::VetCareClient;
    use crate::http::HttpMethod;
    use crate::resource::Resource;
    use crate::types::CreateProduct;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers by method: GET lists return `list`, everything else `write`.
    struct Routes {
        list: String,
        write: String,
        seen: Mutex<Vec<HttpMethod>>,
    }

    #[async_trait]
    impl Transport for Routes {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            self.seen.lock().unwrap().push(request.method);
            let body = match request.method {
                HttpMethod::Get => self.list.clone(),
                _ => self.write.clone(),
            };
            Ok(HttpResponse::new(200, body))
        }
    }

    fn product_json(name: &str) -> String {
        format!(
            r#"{{"id":"{}","name":"{name}","price":1.5,"category":"food","stock":3}}"#,
            Uuid::new_v4()
        )
    }

    fn model(list: String, write: String) -> ProductsViewModel<Routes> {
        let gateway = Gateway::new(
            VetCareClient::new("http://vetcare.test"),
            Routes {
                list,
                write,
                seen: Mutex::new(Vec::new()),
            },
        );
        CrudViewModel::new(Arc::new(gateway))
    }

    fn new_product() -> CreateProduct {
        CreateProduct {
            name: "Kibble".to_string(),
            price: 1.5,
            category: "food".to_string(),
            description: None,
            stock: 3,
        }
    }

    #[tokio::test]
    async fn open_publishes_loading_before_returning() {
        let vm = model(
            format!(r#"{{"success":true,"data":[{}]}}"#, product_json("A")),
            String::new(),
        );
        let vm: ProductsViewModel<Routes> = CrudViewModel::open(Arc::clone(vm.gateway()));
        assert!(vm.items().get().is_loading());

        vm.settled().await;
        let items = vm.items().get().into_data().unwrap();
        assert_eq!(items[0].name, "A");
    }

    #[tokio::test]
    async fn successful_create_refreshes_list() {
        let vm = model(
            format!(r#"{{"success":true,"data":[{}]}}"#, product_json("Kibble")),
            format!(r#"{{"success":true,"data":{}}}"#, product_json("Kibble")),
        );
        let mut items = vm.items().transitions();

        vm.create(new_product());
        vm.settled().await;

        assert!(vm.saved().get().is_success());
        assert_eq!(items.try_recv().unwrap(), Resource::Loading(None));
        assert!(items.try_recv().unwrap().is_success());
        let seen = vm.gateway().transport().seen.lock().unwrap().clone();
        assert_eq!(seen, vec![HttpMethod::Post, HttpMethod::Get]);
    }

    #[tokio::test]
    async fn rejected_mutation_does_not_refetch() {
        let vm = model(
            r#"{"success":true,"data":[]}"#.to_string(),
            r#"{"success":false,"message":"administrator role required"}"#.to_string(),
        );

        let err = vm.create_now(new_product()).await.unwrap_err();
        vm.settled().await;

        assert_eq!(err, ApiError::Rejected("administrator role required".into()));
        assert_eq!(vm.saved().get(), Resource::error("administrator role required"));
        assert!(vm.items().get().is_idle());
    }

    #[tokio::test]
    async fn delete_publishes_server_message() {
        let vm = model(
            r#"{"success":true,"data":[]}"#.to_string(),
            r#"{"success":true,"message":"product deleted","data":null}"#.to_string(),
        );
        let message = vm.delete_now(Uuid::new_v4()).await.unwrap();
        vm.settled().await;

        assert_eq!(message, "product deleted");
        assert_eq!(vm.deleted().get(), Resource::Success("product deleted".into()));
        assert_eq!(vm.items().get(), Resource::Success(Vec::new()));
    }

    #[tokio::test]
    async fn dropping_the_model_aborts_work() {
        struct Slow;

        #[async_trait]
        impl Transport for Slow {
            async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse, ApiError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(HttpResponse::new(200, r#"{"success":true,"data":[]}"#))
            }
        }

        let gateway = Arc::new(Gateway::new(VetCareClient::new("http://vetcare.test"), Slow));
        let vm: ProductsViewModel<Slow> = CrudViewModel::open(gateway);
        let mut rx = vm.items().subscribe();
        drop(vm);

        // The sender side is gone once the aborted task releases the slot.
        let closed = tokio::time::timeout(Duration::from_secs(1), async {
            while rx.changed().await.is_ok() {}
        })
        .await;
        assert!(closed.is_ok());
    }
}
