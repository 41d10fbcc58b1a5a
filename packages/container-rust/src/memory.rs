//! In-memory backend: session, provider, and metadata resolver in one.
//!
//! Backs demos and tests without a database. Rows live in [`DashMap`]
//! tables keyed by identifier; queries evaluate predicates and ordering
//! in process over a snapshot. Transactions are bookkeeping only (the
//! data has no undo log), which is exactly enough to verify who commits
//! when.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use entitygrid_core::filter::{matches_all, Predicate};
use entitygrid_core::metadata::{EntityDescriptor, PropertyKind};
use entitygrid_core::ordering::compare_records;
use entitygrid_core::record::Record;
use entitygrid_core::types::{Id, Value};

use crate::error::{ContainerError, Result};
use crate::query::QuerySpec;
use crate::traits::{MetadataResolver, PersistenceSession, SessionProvider};

type Table = DashMap<Id, Record>;

struct BackendInner {
    descriptors: DashMap<String, Arc<EntityDescriptor>>,
    tables: DashMap<String, Table>,
    id_counters: DashMap<String, i64>,
}

impl BackendInner {
    fn descriptor(&self, entity: &str) -> Result<Arc<EntityDescriptor>> {
        self.descriptors
            .get(entity)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ContainerError::UnknownEntity(entity.to_string()))
    }

    fn snapshot(&self, entity: &str) -> Result<Vec<Record>> {
        let table = self
            .tables
            .get(entity)
            .ok_or_else(|| ContainerError::UnknownEntity(entity.to_string()))?;
        Ok(table.iter().map(|entry| entry.value().clone()).collect())
    }

    fn next_id(&self, entity: &str) -> i64 {
        let mut counter = self.id_counters.entry(entity.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }
}

/// Whole in-memory store. Register entity descriptors up front, then
/// use it as both [`SessionProvider`] and [`MetadataResolver`].
pub struct MemoryBackend {
    inner: Arc<BackendInner>,
    session: Arc<MemorySession>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        let inner = Arc::new(BackendInner {
            descriptors: DashMap::new(),
            tables: DashMap::new(),
            id_counters: DashMap::new(),
        });
        let session = Arc::new(MemorySession {
            inner: Arc::clone(&inner),
            open: AtomicBool::new(false),
            begins: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
        });
        Self { inner, session }
    }

    /// Registers an entity type and creates its (empty) table.
    pub fn register(&self, descriptor: EntityDescriptor) {
        let entity = descriptor.entity.clone();
        self.inner
            .descriptors
            .insert(entity.clone(), Arc::new(descriptor));
        self.inner.tables.entry(entity).or_default();
    }

    /// The backing session as its concrete type, for inspecting
    /// transaction counters in tests.
    #[must_use]
    pub fn session_handle(&self) -> Arc<MemorySession> {
        Arc::clone(&self.session)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionProvider for MemoryBackend {
    fn session(&self) -> Result<Arc<dyn PersistenceSession>> {
        Ok(Arc::clone(&self.session) as Arc<dyn PersistenceSession>)
    }
}

impl MetadataResolver for MemoryBackend {
    fn descriptor(&self, entity: &str) -> Result<Arc<EntityDescriptor>> {
        self.inner.descriptor(entity)
    }
}

/// Session over the in-memory tables. There is one per backend; every
/// provider call hands out the same handle.
pub struct MemorySession {
    inner: Arc<BackendInner>,
    open: AtomicBool,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl MemorySession {
    /// How many transactions have been begun.
    #[must_use]
    pub fn begin_count(&self) -> usize {
        self.begins.load(Ordering::Relaxed)
    }

    /// How many commits have been issued.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::Relaxed)
    }

    /// How many rollbacks have been issued.
    #[must_use]
    pub fn rollback_count(&self) -> usize {
        self.rollbacks.load(Ordering::Relaxed)
    }

    /// Whether a transaction is currently open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    fn generated_id(&self, descriptor: &EntityDescriptor) -> Result<Id> {
        if descriptor.has_composite_id() {
            return Err(ContainerError::Unsupported(format!(
                "entity '{}' has a composite identifier; assign it before saving",
                descriptor.entity
            )));
        }
        let id_kind = descriptor
            .property(&descriptor.id_property)
            .map(|p| &p.kind);
        let next = self.inner.next_id(&descriptor.entity);
        match id_kind {
            Some(PropertyKind::Int) | None => Ok(Id::Int(next)),
            Some(PropertyKind::Text) => Ok(Id::Text(format!("{}-{next}", descriptor.entity))),
            Some(other) => Err(ContainerError::Unsupported(format!(
                "cannot generate an identifier for property kind {other:?}"
            ))),
        }
    }

    fn filtered_rows(&self, entity: &str, predicates: &[Predicate]) -> Result<Vec<Record>> {
        let rows = self.inner.snapshot(entity)?;
        let tables = &self.inner.tables;
        let lookup = |target: &str, id: &Id| {
            tables
                .get(target)
                .and_then(|table| table.get(id).map(|row| row.values.clone()))
        };
        Ok(rows
            .into_iter()
            .filter(|row| matches_all(predicates, &row.values, &lookup))
            .collect())
    }

    fn windowed_rows(&self, query: &QuerySpec) -> Result<Vec<Record>> {
        let mut rows = self.filtered_rows(&query.entity, &query.predicates)?;
        rows.sort_by(|a, b| compare_records(a, b, &query.order));
        let limit = query.limit.unwrap_or(rows.len());
        Ok(rows.into_iter().skip(query.offset).take(limit).collect())
    }
}

impl PersistenceSession for MemorySession {
    fn begin_or_join(&self) -> Result<()> {
        if !self.open.swap(true, Ordering::Relaxed) {
            self.begins.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn get(&self, entity: &str, id: &Id) -> Result<Option<Record>> {
        let table = self
            .inner
            .tables
            .get(entity)
            .ok_or_else(|| ContainerError::UnknownEntity(entity.to_string()))?;
        Ok(table.get(id).map(|row| row.clone()))
    }

    fn save(&self, entity: &str, record: &Record) -> Result<Id> {
        let descriptor = self.inner.descriptor(entity)?;
        let mut stored = record.clone();
        stored.version = 0;

        let id = match stored.id(&descriptor) {
            Some(id) => id,
            None => {
                let id = self.generated_id(&descriptor)?;
                stored.set_value(&descriptor.id_property, id_value(&id));
                id
            }
        };

        let table = self
            .inner
            .tables
            .get(entity)
            .ok_or_else(|| ContainerError::UnknownEntity(entity.to_string()))?;
        if table.contains_key(&id) {
            return Err(anyhow::anyhow!("duplicate identifier {id} for entity '{entity}'").into());
        }
        table.insert(id.clone(), stored);
        Ok(id)
    }

    fn update(&self, entity: &str, id: &Id, record: &Record) -> Result<Record> {
        let table = self
            .inner
            .tables
            .get(entity)
            .ok_or_else(|| ContainerError::UnknownEntity(entity.to_string()))?;
        let Some(existing) = table.get(id).map(|row| row.clone()) else {
            return Err(ContainerError::Missing {
                entity: entity.to_string(),
                id: id.clone(),
            });
        };
        if existing.version != record.version {
            return Err(ContainerError::Conflict {
                entity: entity.to_string(),
                id: id.clone(),
                stored: existing.version,
                carried: record.version,
            });
        }
        let mut stored = record.clone();
        stored.version = record.version + 1;
        table.insert(id.clone(), stored.clone());
        Ok(stored)
    }

    fn delete(&self, entity: &str, id: &Id) -> Result<bool> {
        let table = self
            .inner
            .tables
            .get(entity)
            .ok_or_else(|| ContainerError::UnknownEntity(entity.to_string()))?;
        Ok(table.remove(id).is_some())
    }

    fn fetch(&self, query: &QuerySpec) -> Result<Vec<Record>> {
        self.windowed_rows(query)
    }

    fn count(&self, entity: &str, predicates: &[Predicate]) -> Result<u64> {
        Ok(self.filtered_rows(entity, predicates)?.len() as u64)
    }

    fn fetch_ids(&self, query: &QuerySpec) -> Result<Vec<Id>> {
        let descriptor = self.inner.descriptor(&query.entity)?;
        Ok(self
            .windowed_rows(query)?
            .iter()
            .filter_map(|row| row.id(&descriptor))
            .collect())
    }

    fn commit(&self) -> Result<()> {
        if self.open.swap(false, Ordering::Relaxed) {
            self.commits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        if self.open.swap(false, Ordering::Relaxed) {
            self.rollbacks.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

fn id_value(id: &Id) -> Value {
    match id {
        Id::Int(n) => Value::Int(*n),
        Id::Text(s) => Value::Text(s.clone()),
        Id::Composite(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use entitygrid_core::metadata::PropertyDescriptor;
    use entitygrid_core::ordering::{build_order, ScanDirection, SortDirection, SortKey};

    use super::*;

    fn person_descriptor() -> EntityDescriptor {
        EntityDescriptor::new(
            "Person",
            "id",
            vec![
                PropertyDescriptor::new("id", PropertyKind::Int),
                PropertyDescriptor::new("name", PropertyKind::Text),
                PropertyDescriptor::new("age", PropertyKind::Int),
                PropertyDescriptor::new(
                    "group",
                    PropertyKind::Association {
                        target: "Group".into(),
                    },
                ),
            ],
        )
    }

    fn group_descriptor() -> EntityDescriptor {
        EntityDescriptor::new(
            "Group",
            "id",
            vec![
                PropertyDescriptor::new("id", PropertyKind::Int),
                PropertyDescriptor::new("name", PropertyKind::Text),
            ],
        )
        .with_filtering_property("name")
    }

    fn make_backend() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.register(person_descriptor());
        backend.register(group_descriptor());
        backend
    }

    fn make_person(name: &str, age: i64) -> Record {
        let mut record = Record::new();
        record.set_value("name", Value::Text(name.to_string()));
        record.set_value("age", Value::Int(age));
        record
    }

    fn seed_people(session: &MemorySession) -> Vec<Id> {
        ["Anna", "Bob", "Carol", "Dan", "Eve"]
            .iter()
            .enumerate()
            .map(|(i, name)| {
                session
                    .save("Person", &make_person(name, 20 + i as i64 * 5))
                    .unwrap()
            })
            .collect()
    }

    fn person_query(predicates: Vec<Predicate>, offset: usize, limit: Option<usize>) -> QuerySpec {
        QuerySpec {
            entity: "Person".into(),
            predicates,
            order: build_order(&[], &person_descriptor(), ScanDirection::Forward),
            offset,
            limit,
        }
    }

    #[test]
    fn save_generates_sequential_int_ids() {
        let backend = make_backend();
        let session = backend.session_handle();

        let ids = seed_people(&session);

        assert_eq!(ids, (1..=5).map(Id::Int).collect::<Vec<_>>());
        // The generated id is written back into the stored row.
        let first = session.get("Person", &Id::Int(1)).unwrap().unwrap();
        assert_eq!(first.value("id"), Some(&Value::Int(1)));
    }

    #[test]
    fn save_respects_explicit_ids() {
        let backend = make_backend();
        let session = backend.session_handle();

        let mut record = make_person("Anna", 30);
        record.set_value("id", Value::Int(99));
        let id = session.save("Person", &record).unwrap();

        assert_eq!(id, Id::Int(99));
        assert!(session.get("Person", &Id::Int(99)).unwrap().is_some());
    }

    #[test]
    fn save_rejects_duplicate_identifiers() {
        let backend = make_backend();
        let session = backend.session_handle();

        let mut record = make_person("Anna", 30);
        record.set_value("id", Value::Int(1));
        session.save("Person", &record).unwrap();

        let err = session.save("Person", &record).unwrap_err();
        assert!(matches!(err, ContainerError::Backend(_)));
        assert!(err.to_string().contains("duplicate identifier"));
    }

    #[test]
    fn text_identifiers_derive_from_the_entity_name() {
        let backend = MemoryBackend::new();
        backend.register(EntityDescriptor::new(
            "Document",
            "code",
            vec![
                PropertyDescriptor::new("code", PropertyKind::Text),
                PropertyDescriptor::new("title", PropertyKind::Text),
            ],
        ));
        let session = backend.session_handle();

        let mut record = Record::new();
        record.set_value("title", Value::Text("Report".into()));
        let id = session.save("Document", &record).unwrap();

        assert_eq!(id, Id::Text("Document-1".into()));
    }

    #[test]
    fn composite_identifiers_must_be_assigned_by_the_caller() {
        let backend = MemoryBackend::new();
        backend.register(EntityDescriptor::new(
            "OrderLine",
            "id",
            vec![
                PropertyDescriptor::new("order_no", PropertyKind::Int).key_component(),
                PropertyDescriptor::new("line_no", PropertyKind::Int).key_component(),
            ],
        ));
        let session = backend.session_handle();

        let err = session.save("OrderLine", &Record::new()).unwrap_err();
        assert!(matches!(err, ContainerError::Unsupported(_)));

        // With both components set the save goes through.
        let mut record = Record::new();
        record.set_value("order_no", Value::Int(7));
        record.set_value("line_no", Value::Int(1));
        let id = session.save("OrderLine", &record).unwrap();
        assert_eq!(id, Id::Composite(vec![Id::Int(7), Id::Int(1)]));
    }

    #[test]
    fn get_missing_row_is_none() {
        let backend = make_backend();
        let session = backend.session_handle();
        assert_eq!(session.get("Person", &Id::Int(1)).unwrap(), None);
    }

    #[test]
    fn unknown_entity_fails_fast() {
        let backend = make_backend();
        let session = backend.session_handle();
        let err = session.get("Unicorn", &Id::Int(1)).unwrap_err();
        assert!(matches!(err, ContainerError::UnknownEntity(e) if e == "Unicorn"));
    }

    #[test]
    fn update_advances_the_version() {
        let backend = make_backend();
        let session = backend.session_handle();
        let id = session.save("Person", &make_person("Anna", 30)).unwrap();

        let mut loaded = session.get("Person", &id).unwrap().unwrap();
        loaded.set_value("age", Value::Int(31));
        let stored = session.update("Person", &id, &loaded).unwrap();

        assert_eq!(stored.version, 1);
        assert_eq!(stored.value("age"), Some(&Value::Int(31)));
        let reloaded = session.get("Person", &id).unwrap().unwrap();
        assert_eq!(reloaded.version, 1);
    }

    #[test]
    fn update_with_a_stale_version_is_a_conflict() {
        let backend = make_backend();
        let session = backend.session_handle();
        let id = session.save("Person", &make_person("Anna", 30)).unwrap();

        let stale = session.get("Person", &id).unwrap().unwrap();
        let mut fresh = stale.clone();
        fresh.set_value("age", Value::Int(31));
        session.update("Person", &id, &fresh).unwrap();

        let err = session.update("Person", &id, &stale).unwrap_err();
        match err {
            ContainerError::Conflict {
                entity,
                id: conflict_id,
                stored,
                carried,
            } => {
                assert_eq!(entity, "Person");
                assert_eq!(conflict_id, id);
                assert_eq!(stored, 1);
                assert_eq!(carried, 0);
            }
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn update_of_a_missing_row_reports_missing() {
        let backend = make_backend();
        let session = backend.session_handle();
        let err = session
            .update("Person", &Id::Int(1), &make_person("Anna", 30))
            .unwrap_err();
        assert!(matches!(err, ContainerError::Missing { .. }));
    }

    #[test]
    fn delete_reports_whether_a_row_was_removed() {
        let backend = make_backend();
        let session = backend.session_handle();
        let id = session.save("Person", &make_person("Anna", 30)).unwrap();

        assert!(session.delete("Person", &id).unwrap());
        assert!(!session.delete("Person", &id).unwrap());
        assert_eq!(session.get("Person", &id).unwrap(), None);
    }

    #[test]
    fn fetch_orders_and_windows() {
        let backend = make_backend();
        let session = backend.session_handle();
        seed_people(&session);

        let query = QuerySpec {
            order: build_order(
                &[SortKey::new("age", SortDirection::Desc)],
                &person_descriptor(),
                ScanDirection::Forward,
            ),
            ..person_query(vec![], 1, Some(2))
        };
        let rows = session.fetch(&query).unwrap();

        let names: Vec<_> = rows.iter().map(|r| r.value("name").unwrap().clone()).collect();
        assert_eq!(
            names,
            vec![Value::Text("Dan".into()), Value::Text("Carol".into())]
        );
    }

    #[test]
    fn fetch_ids_projects_identifiers_in_order() {
        let backend = make_backend();
        let session = backend.session_handle();
        seed_people(&session);

        let ids = session.fetch_ids(&person_query(vec![], 0, Some(3))).unwrap();
        assert_eq!(ids, vec![Id::Int(1), Id::Int(2), Id::Int(3)]);
    }

    #[test]
    fn count_sees_past_the_window() {
        let backend = make_backend();
        let session = backend.session_handle();
        seed_people(&session);

        let predicate = Predicate::IntEquals {
            property: "age".into(),
            expected: 30,
        };
        assert_eq!(session.count("Person", &[]).unwrap(), 5);
        assert_eq!(
            session.count("Person", std::slice::from_ref(&predicate)).unwrap(),
            1
        );
    }

    #[test]
    fn traverse_predicates_follow_references() {
        let backend = make_backend();
        let session = backend.session_handle();

        let mut admins = Record::new();
        admins.set_value("name", Value::Text("Admins".into()));
        let admins_id = session.save("Group", &admins).unwrap();

        let mut anna = make_person("Anna", 30);
        anna.set_value("group", Value::Ref(admins_id));
        session.save("Person", &anna).unwrap();
        session.save("Person", &make_person("Bob", 25)).unwrap();

        let predicate = Predicate::Traverse {
            property: "group".into(),
            target: "Group".into(),
            inner: Box::new(Predicate::TextMatches {
                property: "name".into(),
                needle: "adm".into(),
                mode: entitygrid_core::filter::TextMatchMode::Prefix,
                fold_case: true,
            }),
        };
        let rows = session
            .fetch(&person_query(vec![predicate], 0, None))
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value("name"), Some(&Value::Text("Anna".into())));
    }

    #[test]
    fn transaction_bookkeeping() {
        let backend = make_backend();
        let session = backend.session_handle();
        assert!(!session.in_transaction());

        session.begin_or_join().unwrap();
        session.begin_or_join().unwrap();
        assert!(session.in_transaction());
        assert_eq!(session.begin_count(), 1, "join does not begin again");

        session.commit().unwrap();
        assert!(!session.in_transaction());
        assert_eq!(session.commit_count(), 1);

        session.commit().unwrap();
        assert_eq!(session.commit_count(), 1, "commit without transaction is a no-op");

        session.begin_or_join().unwrap();
        session.rollback().unwrap();
        assert_eq!(session.rollback_count(), 1);
        assert_eq!(session.begin_count(), 2);
    }

    #[test]
    fn provider_hands_out_the_same_session() {
        let backend = make_backend();
        let a = backend.session().unwrap();
        let b = backend.session().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
