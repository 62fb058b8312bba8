//! In-memory backend for the VetCare REST contract.
//!
//! # Design
//! Every response carries the `{ success, message, data }` envelope the client
//! core expects. Business-rule rejections answer `200` with `success: false`;
//! missing entities, missing tokens and missing privileges answer `404`, `401`
//! and `403`. DTOs are defined independently from the core crate so the
//! integration tests catch schema drift.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Credentials of the administrator account every fresh store is seeded with.
pub const ADMIN_EMAIL: &str = "admin@vetcare.test";
pub const ADMIN_PASSWORD: &str = "admin123";

const MIN_PASSWORD_LEN: usize = 6;
const SUPPORTED_PROVIDERS: &[&str] = &["google"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Admin,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: User,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
}

#[derive(Deserialize)]
pub struct FederatedLoginRequest {
    pub provider: String,
    pub id_token: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pet {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub weight_kg: Option<f64>,
}

#[derive(Deserialize)]
pub struct CreatePet {
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub weight_kg: Option<f64>,
}

#[derive(Deserialize)]
pub struct UpdatePet {
    pub name: Option<String>,
    pub species: Option<String>,
    pub breed: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub weight_kg: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    fn can_become(self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Completed) | (Confirmed, Cancelled)
        )
    }

    fn is_final(self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub pet_id: Uuid,
    pub clinic_id: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
    pub reason: String,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateAppointment {
    pub pet_id: Uuid,
    pub clinic_id: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
    pub reason: String,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateAppointment {
    pub clinic_id: Option<Uuid>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct StatusChange {
    pub status: AppointmentStatus,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Clinic {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub open_24h: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Deserialize)]
pub struct CreateClinic {
    pub name: String,
    pub address: String,
    pub phone: String,
    #[serde(default)]
    pub open_24h: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Deserialize)]
pub struct UpdateClinic {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub open_24h: Option<bool>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub category: String,
    pub stock: u32,
}

#[derive(Deserialize)]
pub struct CreateProduct {
    pub name: String,
    pub price: f64,
    pub category: String,
    pub description: Option<String>,
    #[serde(default)]
    pub stock: u32,
}

#[derive(Deserialize)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub stock: Option<u32>,
}

#[derive(Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct CreateOrder {
    pub lines: Vec<OrderLine>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: Uuid,
    pub name: String,
    pub unit_price: f64,
    pub quantity: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub items: Vec<OrderItem>,
    pub total: f64,
    pub created_at: DateTime<Utc>,
}

struct Account {
    user: User,
    password: String,
}

/// Backing state for one mock backend instance.
#[derive(Default)]
pub struct Store {
    accounts: HashMap<Uuid, Account>,
    federated: HashMap<String, Uuid>,
    tokens: HashMap<String, Uuid>,
    pets: HashMap<Uuid, Pet>,
    appointments: HashMap<Uuid, Appointment>,
    clinics: HashMap<Uuid, Clinic>,
    products: HashMap<Uuid, Product>,
    orders: Vec<Order>,
}

impl Store {
    /// A store holding only the administrator account.
    pub fn seeded() -> Self {
        let mut store = Store::default();
        let admin = User {
            id: Uuid::new_v4(),
            name: "Administrator".to_string(),
            email: ADMIN_EMAIL.to_string(),
            phone: None,
            role: Role::Admin,
        };
        store.accounts.insert(
            admin.id,
            Account {
                user: admin,
                password: ADMIN_PASSWORD.to_string(),
            },
        );
        store
    }

    fn issue_session(&mut self, user: User) -> Session {
        let token = Uuid::new_v4().simple().to_string();
        self.tokens.insert(token.clone(), user.id);
        tracing::debug!(user = %user.email, "session issued");
        Session { token, user }
    }

    fn email_taken(&self, email: &str) -> bool {
        self.accounts
            .values()
            .any(|account| account.user.email.eq_ignore_ascii_case(email))
    }
}

pub type Db = Arc<RwLock<Store>>;

type Reply = (StatusCode, Json<Value>);

pub fn app() -> Router {
    router(Arc::new(RwLock::new(Store::seeded())))
}

pub fn router(db: Db) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/federated", post(federated_login))
        .route("/products", get(list_products).post(create_product))
        .route(
            "/products/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/clinics", get(list_clinics).post(create_clinic))
        .route(
            "/clinics/{id}",
            get(get_clinic).put(update_clinic).delete(delete_clinic),
        )
        .route("/pets", get(list_pets).post(create_pet))
        .route("/pets/{id}", get(get_pet).put(update_pet).delete(delete_pet))
        .route(
            "/appointments",
            get(list_appointments).post(create_appointment),
        )
        .route(
            "/appointments/{id}",
            get(get_appointment)
                .put(update_appointment)
                .delete(delete_appointment),
        )
        .route("/appointments/{id}/status", patch(change_status))
        .route("/appointments/{id}/cancel", post(cancel_appointment))
        .route("/orders", get(list_orders).post(checkout))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

// ---------------------------------------------------------------------------
// Envelope helpers
// ---------------------------------------------------------------------------

fn ok<T: Serialize>(data: T) -> Reply {
    (StatusCode::OK, Json(json!({ "success": true, "data": data })))
}

fn created<T: Serialize>(data: T, message: &str) -> Reply {
    (
        StatusCode::CREATED,
        Json(json!({ "success": true, "message": message, "data": data })),
    )
}

fn ack(message: &str) -> Reply {
    (
        StatusCode::OK,
        Json(json!({ "success": true, "message": message })),
    )
}

fn rejected(message: impl Into<String>) -> Reply {
    (
        StatusCode::OK,
        Json(json!({ "success": false, "message": message.into() })),
    )
}

fn failure(status: StatusCode, message: impl Into<String>) -> Reply {
    (status, Json(json!({ "success": false, "message": message.into() })))
}

fn not_found(noun: &str) -> Reply {
    failure(StatusCode::NOT_FOUND, format!("{noun} not found"))
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn authenticate(store: &Store, headers: &HeaderMap) -> Result<User, Reply> {
    let token =
        bearer(headers).ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "missing bearer token"))?;
    store
        .tokens
        .get(token)
        .and_then(|user_id| store.accounts.get(user_id))
        .map(|account| account.user.clone())
        .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "invalid or expired token"))
}

fn require_admin(store: &Store, headers: &HeaderMap) -> Result<User, Reply> {
    let user = authenticate(store, headers)?;
    if user.role != Role::Admin {
        return Err(failure(StatusCode::FORBIDDEN, "administrator role required"));
    }
    Ok(user)
}

fn can_access(user: &User, owner_id: Uuid) -> bool {
    user.role == Role::Admin || user.id == owner_id
}

async fn login(State(db): State<Db>, Json(input): Json<LoginRequest>) -> Reply {
    let mut store = db.write().await;
    let user = store
        .accounts
        .values()
        .find(|account| {
            account.user.email.eq_ignore_ascii_case(input.email.trim())
                && account.password == input.password
        })
        .map(|account| account.user.clone());
    match user {
        Some(user) => ok(store.issue_session(user)),
        None => rejected("invalid email or password"),
    }
}

async fn register(State(db): State<Db>, Json(input): Json<RegisterRequest>) -> Reply {
    let email = input.email.trim();
    if input.name.trim().is_empty() {
        return rejected("name is required");
    }
    if !email.contains('@') {
        return rejected("a valid email address is required");
    }
    if input.password.len() < MIN_PASSWORD_LEN {
        return rejected(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        ));
    }

    let mut store = db.write().await;
    if store.email_taken(email) {
        return rejected("email already registered");
    }
    let user = User {
        id: Uuid::new_v4(),
        name: input.name.trim().to_string(),
        email: email.to_string(),
        phone: input.phone,
        role: Role::Client,
    };
    store.accounts.insert(
        user.id,
        Account {
            user: user.clone(),
            password: input.password,
        },
    );
    let session = store.issue_session(user);
    created(session, "account created")
}

async fn federated_login(
    State(db): State<Db>,
    Json(input): Json<FederatedLoginRequest>,
) -> Reply {
    if !SUPPORTED_PROVIDERS.contains(&input.provider.as_str()) {
        return rejected(format!("unsupported identity provider: {}", input.provider));
    }
    if input.id_token.trim().is_empty() {
        return rejected("identity token is required");
    }

    let mut store = db.write().await;
    let subject = format!("{}:{}", input.provider, input.id_token);
    let existing = store
        .federated
        .get(&subject)
        .and_then(|user_id| store.accounts.get(user_id))
        .map(|account| account.user.clone());
    let user = match existing {
        Some(user) => user,
        None => {
            let id = Uuid::new_v4();
            let user = User {
                id,
                name: format!("{} user", input.provider),
                email: format!("{}@{}.federated", id.simple(), input.provider),
                phone: None,
                role: Role::Client,
            };
            store.accounts.insert(
                id,
                Account {
                    user: user.clone(),
                    password: String::new(),
                },
            );
            store.federated.insert(subject, id);
            user
        }
    };
    ok(store.issue_session(user))
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

async fn list_products(State(db): State<Db>) -> Reply {
    let store = db.read().await;
    let mut products: Vec<Product> = store.products.values().cloned().collect();
    products.sort_by(|a, b| a.name.cmp(&b.name));
    ok(products)
}

async fn get_product(State(db): State<Db>, Path(id): Path<Uuid>) -> Reply {
    let store = db.read().await;
    match store.products.get(&id) {
        Some(product) => ok(product),
        None => not_found("product"),
    }
}

async fn create_product(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<CreateProduct>,
) -> Result<Reply, Reply> {
    let mut store = db.write().await;
    require_admin(&store, &headers)?;
    if input.name.trim().is_empty() {
        return Ok(rejected("product name is required"));
    }
    if !input.price.is_finite() || input.price < 0.0 {
        return Ok(rejected("price must be a non-negative amount"));
    }
    let product = Product {
        id: Uuid::new_v4(),
        name: input.name,
        description: input.description,
        price: input.price,
        category: input.category,
        stock: input.stock,
    };
    store.products.insert(product.id, product.clone());
    Ok(created(product, "product created"))
}

async fn update_product(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(input): Json<UpdateProduct>,
) -> Result<Reply, Reply> {
    let mut store = db.write().await;
    require_admin(&store, &headers)?;
    if input.price.is_some_and(|price| !price.is_finite() || price < 0.0) {
        return Ok(rejected("price must be a non-negative amount"));
    }
    let product = store.products.get_mut(&id).ok_or_else(|| not_found("product"))?;
    if let Some(name) = input.name {
        product.name = name;
    }
    if let Some(price) = input.price {
        product.price = price;
    }
    if let Some(category) = input.category {
        product.category = category;
    }
    if let Some(description) = input.description {
        product.description = Some(description);
    }
    if let Some(stock) = input.stock {
        product.stock = stock;
    }
    Ok(ok(product.clone()))
}

async fn delete_product(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Reply, Reply> {
    let mut store = db.write().await;
    require_admin(&store, &headers)?;
    store
        .products
        .remove(&id)
        .map(|_| ack("product deleted"))
        .ok_or_else(|| not_found("product"))
}

// ---------------------------------------------------------------------------
// Clinics
// ---------------------------------------------------------------------------

async fn list_clinics(State(db): State<Db>) -> Reply {
    let store = db.read().await;
    let mut clinics: Vec<Clinic> = store.clinics.values().cloned().collect();
    clinics.sort_by(|a, b| a.name.cmp(&b.name));
    ok(clinics)
}

async fn get_clinic(State(db): State<Db>, Path(id): Path<Uuid>) -> Reply {
    let store = db.read().await;
    match store.clinics.get(&id) {
        Some(clinic) => ok(clinic),
        None => not_found("clinic"),
    }
}

async fn create_clinic(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<CreateClinic>,
) -> Result<Reply, Reply> {
    let mut store = db.write().await;
    require_admin(&store, &headers)?;
    if input.name.trim().is_empty() {
        return Ok(rejected("clinic name is required"));
    }
    let clinic = Clinic {
        id: Uuid::new_v4(),
        name: input.name,
        address: input.address,
        phone: input.phone,
        open_24h: input.open_24h,
        latitude: input.latitude,
        longitude: input.longitude,
    };
    store.clinics.insert(clinic.id, clinic.clone());
    Ok(created(clinic, "clinic created"))
}

async fn update_clinic(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(input): Json<UpdateClinic>,
) -> Result<Reply, Reply> {
    let mut store = db.write().await;
    require_admin(&store, &headers)?;
    let clinic = store.clinics.get_mut(&id).ok_or_else(|| not_found("clinic"))?;
    if let Some(name) = input.name {
        clinic.name = name;
    }
    if let Some(address) = input.address {
        clinic.address = address;
    }
    if let Some(phone) = input.phone {
        clinic.phone = phone;
    }
    if let Some(open_24h) = input.open_24h {
        clinic.open_24h = open_24h;
    }
    if input.latitude.is_some() {
        clinic.latitude = input.latitude;
    }
    if input.longitude.is_some() {
        clinic.longitude = input.longitude;
    }
    Ok(ok(clinic.clone()))
}

async fn delete_clinic(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Reply, Reply> {
    let mut store = db.write().await;
    require_admin(&store, &headers)?;
    store
        .clinics
        .remove(&id)
        .map(|_| ack("clinic deleted"))
        .ok_or_else(|| not_found("clinic"))
}

// ---------------------------------------------------------------------------
// Pets
// ---------------------------------------------------------------------------

async fn list_pets(State(db): State<Db>, headers: HeaderMap) -> Result<Reply, Reply> {
    let store = db.read().await;
    let user = authenticate(&store, &headers)?;
    let mut pets: Vec<Pet> = store
        .pets
        .values()
        .filter(|pet| can_access(&user, pet.owner_id))
        .cloned()
        .collect();
    pets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(ok(pets))
}

async fn get_pet(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Reply, Reply> {
    let store = db.read().await;
    let user = authenticate(&store, &headers)?;
    store
        .pets
        .get(&id)
        .filter(|pet| can_access(&user, pet.owner_id))
        .map(ok)
        .ok_or_else(|| not_found("pet"))
}

async fn create_pet(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<CreatePet>,
) -> Result<Reply, Reply> {
    let mut store = db.write().await;
    let user = authenticate(&store, &headers)?;
    if input.name.trim().is_empty() {
        return Ok(rejected("pet name is required"));
    }
    let pet = Pet {
        id: Uuid::new_v4(),
        owner_id: user.id,
        name: input.name,
        species: input.species,
        breed: input.breed,
        birth_date: input.birth_date,
        weight_kg: input.weight_kg,
    };
    store.pets.insert(pet.id, pet.clone());
    Ok(created(pet, "pet registered"))
}

async fn update_pet(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(input): Json<UpdatePet>,
) -> Result<Reply, Reply> {
    let mut store = db.write().await;
    let user = authenticate(&store, &headers)?;
    let pet = store
        .pets
        .get_mut(&id)
        .filter(|pet| can_access(&user, pet.owner_id))
        .ok_or_else(|| not_found("pet"))?;
    if let Some(name) = input.name {
        pet.name = name;
    }
    if let Some(species) = input.species {
        pet.species = species;
    }
    if input.breed.is_some() {
        pet.breed = input.breed;
    }
    if input.birth_date.is_some() {
        pet.birth_date = input.birth_date;
    }
    if input.weight_kg.is_some() {
        pet.weight_kg = input.weight_kg;
    }
    Ok(ok(pet.clone()))
}

async fn delete_pet(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Reply, Reply> {
    let mut store = db.write().await;
    let user = authenticate(&store, &headers)?;
    let allowed = store
        .pets
        .get(&id)
        .is_some_and(|pet| can_access(&user, pet.owner_id));
    if !allowed {
        return Err(not_found("pet"));
    }
    store.pets.remove(&id);
    Ok(ack("pet removed"))
}

// ---------------------------------------------------------------------------
// Appointments
// ---------------------------------------------------------------------------

async fn list_appointments(State(db): State<Db>, headers: HeaderMap) -> Result<Reply, Reply> {
    let store = db.read().await;
    let user = authenticate(&store, &headers)?;
    let mut appointments: Vec<Appointment> = store
        .appointments
        .values()
        .filter(|appointment| can_access(&user, appointment.owner_id))
        .cloned()
        .collect();
    appointments.sort_by_key(|appointment| appointment.scheduled_at);
    Ok(ok(appointments))
}

async fn get_appointment(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Reply, Reply> {
    let store = db.read().await;
    let user = authenticate(&store, &headers)?;
    store
        .appointments
        .get(&id)
        .filter(|appointment| can_access(&user, appointment.owner_id))
        .map(ok)
        .ok_or_else(|| not_found("appointment"))
}

async fn create_appointment(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<CreateAppointment>,
) -> Result<Reply, Reply> {
    let mut store = db.write().await;
    let user = authenticate(&store, &headers)?;
    let pet = store
        .pets
        .get(&input.pet_id)
        .filter(|pet| can_access(&user, pet.owner_id))
        .ok_or_else(|| not_found("pet"))?;
    let owner_id = pet.owner_id;
    if let Some(clinic_id) = input.clinic_id {
        if !store.clinics.contains_key(&clinic_id) {
            return Err(not_found("clinic"));
        }
    }
    if input.scheduled_at <= Utc::now() {
        return Ok(rejected("appointment time must be in the future"));
    }
    let appointment = Appointment {
        id: Uuid::new_v4(),
        owner_id,
        pet_id: input.pet_id,
        clinic_id: input.clinic_id,
        scheduled_at: input.scheduled_at,
        reason: input.reason,
        status: AppointmentStatus::Pending,
        notes: input.notes,
    };
    store.appointments.insert(appointment.id, appointment.clone());
    Ok(created(appointment, "appointment booked"))
}

async fn update_appointment(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(input): Json<UpdateAppointment>,
) -> Result<Reply, Reply> {
    let mut store = db.write().await;
    let user = authenticate(&store, &headers)?;
    if let Some(clinic_id) = input.clinic_id {
        if !store.clinics.contains_key(&clinic_id) {
            return Err(not_found("clinic"));
        }
    }
    let appointment = store
        .appointments
        .get_mut(&id)
        .filter(|appointment| can_access(&user, appointment.owner_id))
        .ok_or_else(|| not_found("appointment"))?;
    if appointment.status.is_final() {
        return Ok(rejected(format!(
            "cannot edit a {} appointment",
            appointment.status.as_str()
        )));
    }
    if let Some(scheduled_at) = input.scheduled_at {
        if scheduled_at <= Utc::now() {
            return Ok(rejected("appointment time must be in the future"));
        }
        appointment.scheduled_at = scheduled_at;
    }
    if input.clinic_id.is_some() {
        appointment.clinic_id = input.clinic_id;
    }
    if let Some(reason) = input.reason {
        appointment.reason = reason;
    }
    if input.notes.is_some() {
        appointment.notes = input.notes;
    }
    Ok(ok(appointment.clone()))
}

fn transition(appointment: &mut Appointment, next: AppointmentStatus) -> Reply {
    if !appointment.status.can_become(next) {
        return rejected(format!(
            "cannot move appointment from {} to {}",
            appointment.status.as_str(),
            next.as_str()
        ));
    }
    appointment.status = next;
    ok(appointment.clone())
}

async fn change_status(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(input): Json<StatusChange>,
) -> Result<Reply, Reply> {
    let mut store = db.write().await;
    require_admin(&store, &headers)?;
    let appointment = store
        .appointments
        .get_mut(&id)
        .ok_or_else(|| not_found("appointment"))?;
    Ok(transition(appointment, input.status))
}

async fn cancel_appointment(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Reply, Reply> {
    let mut store = db.write().await;
    let user = authenticate(&store, &headers)?;
    let appointment = store
        .appointments
        .get_mut(&id)
        .filter(|appointment| can_access(&user, appointment.owner_id))
        .ok_or_else(|| not_found("appointment"))?;
    Ok(transition(appointment, AppointmentStatus::Cancelled))
}

async fn delete_appointment(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Reply, Reply> {
    let mut store = db.write().await;
    let user = authenticate(&store, &headers)?;
    let allowed = store
        .appointments
        .get(&id)
        .is_some_and(|appointment| can_access(&user, appointment.owner_id));
    if !allowed {
        return Err(not_found("appointment"));
    }
    store.appointments.remove(&id);
    Ok(ack("appointment deleted"))
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

async fn list_orders(State(db): State<Db>, headers: HeaderMap) -> Result<Reply, Reply> {
    let store = db.read().await;
    let user = authenticate(&store, &headers)?;
    let orders: Vec<&Order> = store
        .orders
        .iter()
        .filter(|order| can_access(&user, order.owner_id))
        .collect();
    Ok(ok(orders))
}

async fn checkout(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<CreateOrder>,
) -> Result<Reply, Reply> {
    let mut store = db.write().await;
    let user = authenticate(&store, &headers)?;
    if input.lines.is_empty() {
        return Ok(rejected("order has no items"));
    }

    let mut items = Vec::with_capacity(input.lines.len());
    for line in &input.lines {
        if line.quantity == 0 {
            return Ok(rejected("quantity must be at least 1"));
        }
        let product = store
            .products
            .get(&line.product_id)
            .ok_or_else(|| not_found("product"))?;
        if product.stock < line.quantity {
            return Ok(rejected(format!("not enough stock for {}", product.name)));
        }
        items.push(OrderItem {
            product_id: product.id,
            name: product.name.clone(),
            unit_price: product.price,
            quantity: line.quantity,
        });
    }

    for item in &items {
        if let Some(product) = store.products.get_mut(&item.product_id) {
            product.stock -= item.quantity;
        }
    }
    let total: f64 = items
        .iter()
        .map(|item| item.unit_price * f64::from(item.quantity))
        .sum();
    let order = Order {
        id: Uuid::new_v4(),
        owner_id: user.id,
        items,
        total: (total * 100.0).round() / 100.0,
        created_at: Utc::now(),
    };
    tracing::info!(order = %order.id, total = order.total, "order placed");
    store.orders.push(order.clone());
    Ok(created(order, "order placed"))
}
