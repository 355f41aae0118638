//! Stored query store. Queries live at `/queries/{name}`.

use crate::backend::{BackendSession, NodeRef, StorageBackend};
use crate::codec::{read_stored_query, write_stored_query, QUERIES_ROOT, STORED_QUERY_NODE};
use crate::registry::Registry;
use cairn_core::{EntityType, RegistryError, RegistryResult, StorageError, StoredQuery};

fn query_path(name: &str) -> String {
    format!("{}/{}", QUERIES_ROOT, name)
}

fn query_node<S: BackendSession>(session: &S, name: &str) -> RegistryResult<NodeRef> {
    session
        .node_at(&query_path(name))?
        .ok_or_else(|| RegistryError::not_found(EntityType::StoredQuery, name))
}

/// Look up a stored query by name within an open session.
pub fn load_stored_query<S: BackendSession>(session: &S, name: &str) -> RegistryResult<StoredQuery> {
    read_stored_query(session, query_node(session, name)?)
}

impl<B: StorageBackend> Registry<B> {
    pub fn persist_stored_query(&self, query: StoredQuery) -> RegistryResult<StoredQuery> {
        query.validate()?;
        let mut uow = self.begin()?;
        let written = uow
            .session_mut()
            .create_node(&query_path(&query.name), STORED_QUERY_NODE)
            .map_err(|e| match e {
                RegistryError::Storage(StorageError::PathExists { .. }) => {
                    RegistryError::already_exists(EntityType::StoredQuery, query.name.clone())
                }
                other => other,
            })
            .and_then(|node| write_stored_query(uow.session_mut(), node, &query));
        match written {
            Ok(()) => uow.commit()?,
            Err(e) => {
                uow.fail(&e);
                return Err(e);
            }
        }
        tracing::info!(name = %query.name, "Stored query created");
        Ok(query)
    }

    pub fn get_stored_query(&self, name: &str) -> RegistryResult<StoredQuery> {
        self.read(|session| load_stored_query(session, name))
    }

    /// All stored queries, by name.
    pub fn list_stored_queries(&self) -> RegistryResult<Vec<StoredQuery>> {
        self.read(|session| {
            let mut queries = session
                .find_nodes(STORED_QUERY_NODE)?
                .into_iter()
                .map(|node| read_stored_query(session, node))
                .collect::<RegistryResult<Vec<_>>>()?;
            queries.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(queries)
        })
    }

    /// Replace the stored query called `name`. Renames are allowed as long
    /// as the new name is free.
    pub fn update_stored_query(&self, name: &str, query: StoredQuery) -> RegistryResult<StoredQuery> {
        query.validate()?;
        let mut uow = self.begin()?;
        let written = query_node(uow.session(), name).and_then(|node| {
            if query.name == name {
                return write_stored_query(uow.session_mut(), node, &query);
            }
            if uow.session().node_at(&query_path(&query.name))?.is_some() {
                return Err(RegistryError::already_exists(
                    EntityType::StoredQuery,
                    query.name.clone(),
                ));
            }
            uow.session_mut().remove_node(node)?;
            let renamed = uow
                .session_mut()
                .create_node(&query_path(&query.name), STORED_QUERY_NODE)?;
            write_stored_query(uow.session_mut(), renamed, &query)
        });
        match written {
            Ok(()) => uow.commit()?,
            Err(e) => {
                uow.fail(&e);
                return Err(e);
            }
        }
        tracing::info!(name = %name, new_name = %query.name, "Stored query updated");
        Ok(query)
    }

    pub fn delete_stored_query(&self, name: &str) -> RegistryResult<()> {
        let mut uow = self.begin()?;
        let removed = query_node(uow.session(), name).and_then(|node| uow.session_mut().remove_node(node));
        match removed {
            Ok(()) => uow.commit()?,
            Err(e) => {
                uow.fail(&e);
                return Err(e);
            }
        }
        tracing::info!(name = %name, "Stored query deleted");
        Ok(())
    }
}
