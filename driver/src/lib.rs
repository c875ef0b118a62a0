//! MongoDB-backed store for the shelf catalog client.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bson::{Document, doc};
use futures::TryStreamExt;
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, IndexModel};

use shelf_core::aggregate::Pipeline;
use shelf_core::index::IndexSpec;
use shelf_core::mutation::{Patch, UpdateOutcome};
use shelf_core::query::{Filter, FindQuery};
use shelf_core::{DocumentStore, Namespace, ShelfError, ShelfResult, StoreConfig, run_scoped};

/// Sort the mongodb error kinds into the connection/operation split.
fn classify(err: mongodb::error::Error) -> ShelfError {
	match err.kind.as_ref() {
		ErrorKind::ServerSelection { .. }
		| ErrorKind::Io(_)
		| ErrorKind::ConnectionPoolCleared { .. }
		| ErrorKind::DnsResolve { .. }
		| ErrorKind::Authentication { .. } => ShelfError::Connection(err.to_string()),
		ErrorKind::InvalidArgument { .. } => ShelfError::InvalidInput(err.to_string()),
		_ => ShelfError::Operation(err.to_string()),
	}
}

trait MongoResultExt<T> {
	fn shelf(self) -> ShelfResult<T>;
}

impl<T> MongoResultExt<T> for mongodb::error::Result<T> {
	fn shelf(self) -> ShelfResult<T> {
		self.map_err(classify)
	}
}

pub(crate) fn ping_command() -> Document {
	doc! { "ping": 1 }
}

/// `explain` wrapping a find, at the verbosity that carries `executionStats`.
pub(crate) fn explain_command(collection: &str, filter: &Filter) -> Document {
	doc! {
		"explain": { "find": collection, "filter": filter.to_document() },
		"verbosity": "executionStats",
	}
}

/// A collection handle on a live server.
///
/// Clones share the client. Closing one clone closes them all.
#[derive(Debug, Clone)]
pub struct MongoStore {
	client: Client,
	collection: Collection<Document>,
	namespace: Namespace,
	closed: Arc<AtomicBool>,
}

impl MongoStore {
	fn new(client: Client, namespace: Namespace) -> Self {
		let collection = client
			.database(&namespace.database)
			.collection::<Document>(&namespace.collection);
		Self {
			client,
			collection,
			namespace,
			closed: Arc::new(AtomicBool::new(false)),
		}
	}

	fn check_open(&self) -> ShelfResult<()> {
		if self.closed.load(Ordering::Acquire) {
			return Err(ShelfError::Connection(format!(
				"connection to {} is closed",
				self.namespace
			)));
		}
		Ok(())
	}
}

#[async_trait]
impl DocumentStore for MongoStore {
	fn namespace(&self) -> &Namespace {
		&self.namespace
	}

	async fn ping(&self) -> ShelfResult<()> {
		self.check_open()?;
		self.client
			.database(&self.namespace.database)
			.run_command(ping_command())
			.await
			.map_err(|e| ShelfError::Connection(e.to_string()))?;
		Ok(())
	}

	async fn find(&self, query: &FindQuery) -> ShelfResult<Vec<Document>> {
		self.check_open()?;
		let mut find = self.collection.find(query.filter.to_document());
		if let Some(projection) = &query.projection {
			find = find.projection(projection.to_document());
		}
		if let Some(sort) = &query.sort {
			find = find.sort(sort.to_document());
		}
		if let Some(page) = &query.page {
			find = find
				.skip(page.skip)
				.limit(i64::try_from(page.limit).unwrap_or(i64::MAX));
		}

		let cursor = find.await.shelf()?;
		cursor.try_collect().await.shelf()
	}

	async fn update_one(&self, filter: &Filter, patch: &Patch) -> ShelfResult<UpdateOutcome> {
		self.check_open()?;
		let result = self
			.collection
			.update_one(filter.to_document(), patch.to_update())
			.await
			.shelf()?;
		Ok(UpdateOutcome {
			matched: result.matched_count,
			modified: result.modified_count,
		})
	}

	async fn delete_one(&self, filter: &Filter) -> ShelfResult<u64> {
		self.check_open()?;
		let result = self
			.collection
			.delete_one(filter.to_document())
			.await
			.shelf()?;
		Ok(result.deleted_count)
	}

	async fn aggregate(&self, pipeline: &Pipeline) -> ShelfResult<Vec<Document>> {
		self.check_open()?;
		let cursor = self
			.collection
			.aggregate(pipeline.to_documents())
			.await
			.shelf()?;
		cursor.try_collect().await.shelf()
	}

	async fn create_index(&self, spec: &IndexSpec) -> ShelfResult<String> {
		self.check_open()?;
		let model = IndexModel::builder().keys(spec.to_keys_document()).build();
		let result = self.collection.create_index(model).await.shelf()?;
		Ok(result.index_name)
	}

	async fn index_names(&self) -> ShelfResult<Vec<String>> {
		self.check_open()?;
		self.collection.list_index_names().await.shelf()
	}

	async fn explain_find(&self, filter: &Filter) -> ShelfResult<Document> {
		self.check_open()?;
		let reply = self
			.client
			.database(&self.namespace.database)
			.run_command(explain_command(&self.namespace.collection, filter))
			.await
			.shelf()?;
		reply
			.get_document("executionStats")
			.cloned()
			.map_err(|_| ShelfError::Operation("explain reply has no executionStats".to_string()))
	}

	async fn close(&self) -> ShelfResult<()> {
		if self.closed.swap(true, Ordering::AcqRel) {
			return Ok(());
		}
		self.client.clone().shutdown().await;
		Ok(())
	}
}

/// Owns the client built from a [`StoreConfig`].
pub struct ConnectionManager {
	store: MongoStore,
}

impl ConnectionManager {
	/// Build the client and resolve the configured collection.
	///
	/// No round trip happens here; the first request (normally the ping in
	/// [`ConnectionManager::scoped`]) is what reaches the server.
	pub async fn open(config: &StoreConfig) -> ShelfResult<Self> {
		let mut options = ClientOptions::parse(&config.uri)
			.await
			.map_err(|e| ShelfError::Config(format!("invalid store uri: {e}")))?;
		options.app_name = config.app_name.clone();
		options.connect_timeout = Some(config.connect_timeout());
		options.server_selection_timeout = Some(config.server_selection_timeout());

		let client = Client::with_options(options).shelf()?;
		let namespace = Namespace::new(&config.database, &config.collection);
		tracing::info!(namespace = %namespace, "client created");

		Ok(Self {
			store: MongoStore::new(client, namespace),
		})
	}

	pub fn handle(&self) -> MongoStore {
		self.store.clone()
	}

	pub async fn close(self) -> ShelfResult<()> {
		self.store.close().await
	}

	/// Open, ping, run `body` with the handle, and close on every path.
	pub async fn scoped<F, Fut, T>(config: &StoreConfig, body: F) -> ShelfResult<T>
	where
		F: FnOnce(MongoStore) -> Fut,
		Fut: Future<Output = ShelfResult<T>>,
	{
		let manager = match Self::open(config).await {
			Ok(manager) => manager,
			Err(e) => {
				tracing::error!(error = %e, "cannot open store client");
				return Err(e);
			}
		};
		run_scoped(manager.handle(), body).await
	}
}
