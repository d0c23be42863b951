//! Model viewsets.

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use rivet_core::types::json_kind;
use rivet_core::{
	Error, InternalValue, Model, RequestContext, Representation, ValidationError, Value,
};
use rivet_db::QueryDriver;
use rivet_rest::{MissingSerializer, ModelSerializer, Serializer, SerializerError};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::actions::Action;
use crate::response::ViewResponse;

/// Dispatches requests to actions.
#[async_trait]
pub trait ViewSet: Send + Sync {
	/// Name used in logs and routes.
	fn basename(&self) -> &str;

	/// Picks the action from the request method and the presence of the id
	/// path parameter, then runs it.
	async fn dispatch(&self, request: RequestContext, body: &[u8]) -> ViewResponse;
}

/// List, retrieve, create, update, partial update and destroy for one model.
///
/// Every action uses the default serializer unless an override is registered
/// for it. Actions that are not enabled answer 405.
///
/// # Examples
///
/// ```
/// use http::{Method, StatusCode};
/// use rivet_core::{Model, RequestContext};
/// use rivet_db::MemoryDatabase;
/// use rivet_views::{ModelViewSet, ViewSet};
/// use serde_json::json;
///
/// #[derive(Model)]
/// struct Todo {
///     id: i64,
///     title: String,
/// }
///
/// # tokio_test::block_on(async {
/// let db = MemoryDatabase::new();
/// let todos = ModelViewSet::<Todo, _>::new(db.driver::<Todo>()).unwrap();
///
/// let created = todos
///     .dispatch(RequestContext::new(Method::POST, "/todos"), br#"{"title": "ship"}"#)
///     .await;
/// assert_eq!(created.status, StatusCode::CREATED);
/// assert_eq!(created.body, json!({"id": 1, "title": "ship"}));
///
/// let fetched = todos
///     .dispatch(RequestContext::new(Method::GET, "/todos/1").with_param("id", "1"), b"")
///     .await;
/// assert_eq!(fetched.body["title"], "ship");
/// # });
/// ```
pub struct ModelViewSet<M: Model + 'static, D: QueryDriver> {
	basename: String,
	driver: D,
	serializer: Arc<dyn Serializer>,
	overrides: HashMap<Action, Arc<dyn Serializer>>,
	actions: HashSet<Action>,
	id_param: String,
	_model: PhantomData<fn() -> M>,
}

impl<M: Model + 'static, D: QueryDriver> ModelViewSet<M, D> {
	/// A viewset serializing every field of `M`.
	pub fn new(driver: D) -> Result<Self, SerializerError> {
		Ok(Self::with_serializer(driver, ModelSerializer::<M>::new()?))
	}

	pub fn with_serializer(driver: D, serializer: impl Serializer + 'static) -> Self {
		Self {
			basename: M::meta().name().to_string(),
			driver,
			serializer: Arc::new(serializer),
			overrides: HashMap::new(),
			actions: Action::ALL.into_iter().collect(),
			id_param: "id".to_string(),
			_model: PhantomData,
		}
	}

	/// A viewset without a default serializer; actions fail until one is
	/// registered for them.
	pub fn without_serializer(driver: D) -> Self {
		Self::with_serializer(driver, MissingSerializer::<M>::new())
	}

	pub fn with_action_serializer(
		mut self,
		action: Action,
		serializer: impl Serializer + 'static,
	) -> Self {
		self.overrides.insert(action, Arc::new(serializer));
		self
	}

	/// Restricts the viewset to the given actions.
	pub fn with_actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
		self.actions = actions.into_iter().collect();
		self
	}

	/// Name of the path parameter carrying the record id, `id` by default.
	pub fn with_id_param(mut self, name: impl Into<String>) -> Self {
		self.id_param = name.into();
		self
	}

	pub fn with_basename(mut self, basename: impl Into<String>) -> Self {
		self.basename = basename.into();
		self
	}

	pub fn driver(&self) -> &D {
		&self.driver
	}

	pub fn has_action(&self, action: Action) -> bool {
		self.actions.contains(&action)
	}

	pub fn serializer_for(&self, action: Action) -> &dyn Serializer {
		self.overrides
			.get(&action)
			.unwrap_or(&self.serializer)
			.as_ref()
	}

	pub async fn list(&self, request: RequestContext) -> ViewResponse {
		self.try_list(request).await.unwrap_or_else(ViewResponse::from)
	}

	pub async fn retrieve(&self, request: RequestContext) -> ViewResponse {
		self.try_retrieve(request).await.unwrap_or_else(ViewResponse::from)
	}

	pub async fn create(&self, request: RequestContext, body: &[u8]) -> ViewResponse {
		self.try_create(request, body).await.unwrap_or_else(ViewResponse::from)
	}

	pub async fn update(&self, request: RequestContext, body: &[u8]) -> ViewResponse {
		self.try_update(Action::Update, request, body)
			.await
			.unwrap_or_else(ViewResponse::from)
	}

	pub async fn partial_update(&self, request: RequestContext, body: &[u8]) -> ViewResponse {
		self.try_update(Action::PartialUpdate, request, body)
			.await
			.unwrap_or_else(ViewResponse::from)
	}

	pub async fn destroy(&self, request: RequestContext) -> ViewResponse {
		self.try_destroy(request).await.unwrap_or_else(ViewResponse::from)
	}

	async fn try_list(&self, request: RequestContext) -> Result<ViewResponse, Error> {
		let serializer = self.serializer_for(Action::List);
		let ctx = self.driver.middleware(request);
		ctx.apply(self.driver.filter());
		ctx.apply(self.driver.order());
		ctx.apply(self.driver.pagination());

		let records = self.driver.crud().list(&ctx).await?;
		let items = records
			.iter()
			.map(|record| render(serializer, record, ctx.request()))
			.collect::<Result<Vec<_>, Error>>()?;
		Ok(ViewResponse::ok(self.driver.pagination().format(&ctx.spec(), items)))
	}

	async fn try_retrieve(&self, request: RequestContext) -> Result<ViewResponse, Error> {
		let id = self.id_of(&request)?;
		let serializer = self.serializer_for(Action::Retrieve);
		let ctx = self.driver.middleware(request);
		ctx.apply(self.driver.filter());

		let record = self.driver.crud().retrieve(&ctx, id).await?;
		Ok(ViewResponse::ok(render(serializer, &record, ctx.request())?))
	}

	async fn try_create(&self, request: RequestContext, body: &[u8]) -> Result<ViewResponse, Error> {
		let payload = parse_body(body)?;
		let serializer = self.serializer_for(Action::Create);
		let ctx = self.driver.middleware(request);

		let value = serializer.to_internal_value(&payload, ctx.request())?;
		let created = self.driver.crud().create(&ctx, value).await?;
		Ok(ViewResponse::created(render(serializer, &created, ctx.request())?))
	}

	/// Both update flavours layer the converted payload over the stored
	/// record; validators tell them apart by the request method.
	async fn try_update(
		&self,
		action: Action,
		request: RequestContext,
		body: &[u8],
	) -> Result<ViewResponse, Error> {
		let id = self.id_of(&request)?;
		let payload = parse_body(body)?;
		check_body_id::<M>(&payload, &id)?;
		let serializer = self.serializer_for(action);
		let ctx = self.driver.middleware(request);
		ctx.apply(self.driver.filter());

		let stored = self.driver.crud().retrieve(&ctx, id.clone()).await?;
		let old = serializer.from_db(&stored, ctx.request())?;
		let changes = serializer.to_internal_value(&payload, ctx.request())?;

		let mut new: InternalValue = stored
			.into_iter()
			.filter(|(key, _)| !old.contains_key(key))
			.collect();
		new.extend(old.iter().map(|(key, value)| (key.clone(), value.clone())));
		new.extend(changes);

		let updated = self.driver.crud().update(&ctx, old, new, id).await?;
		Ok(ViewResponse::ok(render(serializer, &updated, ctx.request())?))
	}

	/// Records hidden by the driver filter cannot be destroyed; the lookup
	/// answers 404 for them as retrieve does.
	async fn try_destroy(&self, request: RequestContext) -> Result<ViewResponse, Error> {
		let id = self.id_of(&request)?;
		let ctx = self.driver.middleware(request);
		ctx.apply(self.driver.filter());

		self.driver.crud().retrieve(&ctx, id.clone()).await?;
		self.driver.crud().destroy(&ctx, id).await?;
		Ok(ViewResponse::no_content())
	}

	fn id_of(&self, request: &RequestContext) -> Result<Value, Error> {
		request
			.param(&self.id_param)
			.map(Value::from)
			.ok_or_else(|| Error::BadRequest(format!("Missing `{}` path parameter", self.id_param)))
	}
}

#[async_trait]
impl<M, D> ViewSet for ModelViewSet<M, D>
where
	M: Model + 'static,
	D: QueryDriver,
{
	fn basename(&self) -> &str {
		&self.basename
	}

	async fn dispatch(&self, request: RequestContext, body: &[u8]) -> ViewResponse {
		let detail = request.param(&self.id_param).is_some();
		let Some(action) = Action::from_method(request.method(), detail)
			.filter(|action| self.has_action(*action))
		else {
			debug!(basename = %self.basename, method = %request.method(), detail, "no action");
			return ViewResponse::method_not_allowed();
		};
		debug!(basename = %self.basename, action = %action, "dispatch");

		match action {
			Action::List => self.list(request).await,
			Action::Retrieve => self.retrieve(request).await,
			Action::Create => self.create(request, body).await,
			Action::Update => self.update(request, body).await,
			Action::PartialUpdate => self.partial_update(request, body).await,
			Action::Destroy => self.destroy(request).await,
		}
	}
}

fn render(
	serializer: &dyn Serializer,
	stored: &InternalValue,
	request: &RequestContext,
) -> Result<JsonValue, Error> {
	let value = serializer.from_db(stored, request)?;
	Ok(JsonValue::Object(serializer.to_representation(&value, request)?))
}

fn parse_body(body: &[u8]) -> Result<Representation, Error> {
	match serde_json::from_slice::<JsonValue>(body) {
		Ok(JsonValue::Object(payload)) => Ok(payload),
		Ok(other) => Err(ValidationError::single(
			"all",
			format!("Expected a JSON object, got {}", json_kind(&other)),
		)
		.into()),
		Err(err) => {
			debug!(error = %err, "unparsable request body");
			Err(ValidationError::single("all", "could not parse request body").into())
		}
	}
}

/// An id in the body must address the same record as the path.
fn check_body_id<M: Model>(payload: &Representation, id: &Value) -> Result<(), Error> {
	let pk = M::meta().primary_key().map_or("id", |field| field.name());
	match payload.get(pk) {
		Some(given) if !given.is_null() && !Value::from_json(given).loose_eq(id) => Err(
			ValidationError::single(pk, "id in body does not match id in url").into(),
		),
		_ => Ok(()),
	}
}
