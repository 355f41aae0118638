//! Ontology store.

use crate::backend::{BackendSession, NodeRef, StorageBackend};
use crate::codec::{read_ontology, write_ontology, ONTOLOGIES_ROOT, ONTOLOGY_NODE};
use crate::registry::Registry;
use crate::unit_of_work::UnitOfWork;
use cairn_core::{new_entity_id, EntityType, Ontology, RegistryError, RegistryResult, ValidationError};
use chrono::Utc;

/// Every live ontology visible to the session.
pub fn load_ontologies<S: BackendSession>(session: &S) -> RegistryResult<Vec<Ontology>> {
    session
        .find_nodes(ONTOLOGY_NODE)?
        .into_iter()
        .map(|node| read_ontology(session, node))
        .collect()
}

fn ontology_node<S: BackendSession>(session: &S, uuid: &str) -> RegistryResult<NodeRef> {
    match session.find_by_uuid(uuid)? {
        Some(node) if session.kind_of(node)? == ONTOLOGY_NODE => Ok(node),
        _ => Err(RegistryError::not_found(EntityType::Ontology, uuid)),
    }
}

/// No other ontology may share the base URL.
fn check_unique_base<S: BackendSession>(session: &S, ontology: &Ontology) -> RegistryResult<()> {
    let clash = load_ontologies(session)?
        .into_iter()
        .any(|other| other.base == ontology.base && other.uuid != ontology.uuid);
    if clash {
        return Err(RegistryError::already_exists(EntityType::Ontology, ontology.base.clone()));
    }
    Ok(())
}

fn finish<S: BackendSession, T>(mut uow: UnitOfWork<S>, result: RegistryResult<T>) -> RegistryResult<T> {
    match result {
        Ok(value) => {
            uow.commit()?;
            Ok(value)
        }
        Err(e) => {
            uow.fail(&e);
            Err(e)
        }
    }
}

impl<B: StorageBackend> Registry<B> {
    /// Store a new ontology, assigning a UUID if it has none.
    pub fn persist_ontology(&self, mut ontology: Ontology) -> RegistryResult<Ontology> {
        ontology.validate()?;
        let mut uow = self.begin()?;
        let result = (|| -> RegistryResult<Ontology> {
            let uuid = match ontology.uuid.take().filter(|u| !u.trim().is_empty()) {
                Some(uuid) => uuid,
                None => new_entity_id(),
            };
            if uow.session().find_by_uuid(&uuid)?.is_some() {
                return Err(RegistryError::already_exists(EntityType::Ontology, uuid));
            }
            ontology.uuid = Some(uuid.clone());
            check_unique_base(uow.session(), &ontology)?;

            let now = Utc::now();
            ontology.created_by = Some(uow.principal().to_string());
            ontology.created_on = Some(now);
            ontology.last_modified_by = Some(uow.principal().to_string());
            ontology.last_modified_on = Some(now);

            let node = uow
                .session_mut()
                .create_node(&format!("{}/{}", ONTOLOGIES_ROOT, uuid), ONTOLOGY_NODE)?;
            write_ontology(uow.session_mut(), node, &ontology)?;
            Ok(ontology)
        })();
        let stored = finish(uow, result)?;
        tracing::info!(uuid = %stored.uuid.as_deref().unwrap_or(""), base = %stored.base, "Ontology created");
        Ok(stored)
    }

    pub fn get_ontology(&self, uuid: &str) -> RegistryResult<Ontology> {
        self.read(|session| read_ontology(session, ontology_node(session, uuid)?))
    }

    pub fn list_ontologies(&self) -> RegistryResult<Vec<Ontology>> {
        self.read(|session| load_ontologies(session))
    }

    /// Replace a stored ontology's classes and descriptive fields.
    pub fn update_ontology(&self, mut ontology: Ontology) -> RegistryResult<Ontology> {
        let uuid = ontology
            .uuid
            .clone()
            .ok_or_else(|| ValidationError::RequiredFieldMissing {
                field: "uuid".to_string(),
            })?;
        ontology.validate()?;
        let mut uow = self.begin()?;
        let result = (|| -> RegistryResult<Ontology> {
            let node = ontology_node(uow.session(), &uuid)?;
            let stored = read_ontology(uow.session(), node)?;
            check_unique_base(uow.session(), &ontology)?;
            ontology.created_by = stored.created_by;
            ontology.created_on = stored.created_on;
            ontology.last_modified_by = Some(uow.principal().to_string());
            ontology.last_modified_on = Some(Utc::now());
            write_ontology(uow.session_mut(), node, &ontology)?;
            Ok(ontology)
        })();
        let updated = finish(uow, result)?;
        tracing::info!(uuid = %uuid, "Ontology updated");
        Ok(updated)
    }

    pub fn delete_ontology(&self, uuid: &str) -> RegistryResult<()> {
        let mut uow = self.begin()?;
        let result = ontology_node(uow.session(), uuid)
            .and_then(|node| uow.session_mut().remove_node(node));
        finish(uow, result)?;
        tracing::info!(uuid = %uuid, "Ontology deleted");
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::ErrorKind;

    fn world() -> Ontology {
        let o = Ontology::new("http://example.org/world");
        let japan = o.create_class("Japan");
        let asia = o.create_class("Asia").with_child(japan);
        o.clone().with_root(o.create_class("World").with_child(asia))
    }

    #[test]
    fn test_persist_assigns_uuid_and_stamps() {
        let registry = Registry::in_memory().with_principal("alice");
        let stored = registry.persist_ontology(world()).unwrap();
        let uuid = stored.uuid.clone().unwrap();
        assert_eq!(stored.created_by.as_deref(), Some("alice"));
        assert_eq!(registry.get_ontology(&uuid).unwrap(), stored);
        assert_eq!(registry.list_ontologies().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_base_conflicts() {
        let registry = Registry::in_memory();
        registry.persist_ontology(world()).unwrap();
        let err = registry.persist_ontology(world()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_duplicate_class_is_validation() {
        let registry = Registry::in_memory();
        let o = Ontology::new("http://example.org/dup");
        let bad = o
            .clone()
            .with_root(o.create_class("A"))
            .with_root(o.create_class("A"));
        let err = registry.persist_ontology(bad).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(registry.list_ontologies().unwrap().is_empty());
    }

    #[test]
    fn test_update_reparents_class() {
        let registry = Registry::in_memory();
        let mut stored = registry.persist_ontology(world()).unwrap();
        let japan = stored.detach_class("http://example.org/world#Japan").unwrap();
        stored
            .attach_class(Some("http://example.org/world#World"), japan)
            .unwrap();
        let updated = registry.update_ontology(stored.clone()).unwrap();
        assert_eq!(
            updated
                .parent_of("http://example.org/world#Japan")
                .map(|c| c.id.as_str()),
            Some("World")
        );
        assert_eq!(updated.created_on, stored.created_on);
    }

    #[test]
    fn test_missing_ontology_not_found() {
        let registry = Registry::in_memory();
        assert_eq!(registry.get_ontology("nope").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(registry.delete_ontology("nope").unwrap_err().kind(), ErrorKind::NotFound);
        let mut o = world();
        o.uuid = Some("nope".into());
        assert_eq!(registry.update_ontology(o).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_delete_removes_ontology() {
        let registry = Registry::in_memory();
        let stored = registry.persist_ontology(world()).unwrap();
        let uuid = stored.uuid.unwrap();
        registry.delete_ontology(&uuid).unwrap();
        assert!(registry.list_ontologies().unwrap().is_empty());
    }
}
