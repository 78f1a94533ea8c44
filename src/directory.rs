//! Contact directory and the superior/subordinate escalation tree

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;

use crate::config::ContactEntry;
use crate::error::DirectoryError;
use crate::protocol::Contact;

/// Read-only view of the contact directory used by the redirection engine
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Number of direct subordinates of the contact with this phone
    async fn subordinate_count(&self, phone: &str) -> Result<usize, DirectoryError>;

    /// Direct subordinates of the contact with this phone
    async fn subordinates_of(&self, phone: &str) -> Result<Vec<Contact>, DirectoryError>;
}

/// Node in the escalation tree
#[derive(Debug, Clone)]
struct ContactNode {
    contact: Contact,
    superior: Option<String>,
}

/// Contacts and their superior links.
///
/// Links are not checked for cycles; walkers guard against them instead.
#[derive(Debug, Default)]
pub struct ContactHierarchy {
    /// All nodes by phone
    nodes: HashMap<String, ContactNode>,
    /// Phones in insertion order, so subordinate lists are stable
    order: Vec<String>,
}

/// Escalation tree rooted at one contact, for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscalationTree {
    pub contact: Contact,
    pub subordinates: Vec<EscalationTree>,
}

impl ContactHierarchy {
    /// Create a new empty hierarchy
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a hierarchy from configuration entries
    pub fn from_entries(entries: &[ContactEntry]) -> Self {
        let mut hierarchy = Self::new();
        for entry in entries {
            hierarchy.add_contact(
                Contact::new(entry.phone.clone(), entry.name.clone()),
                entry.superior.clone(),
            );
        }
        hierarchy
    }

    /// Add a contact. Returns false if the phone is already present.
    ///
    /// The superior does not have to exist yet.
    pub fn add_contact(&mut self, contact: Contact, superior: Option<String>) -> bool {
        if self.nodes.contains_key(&contact.phone) {
            return false;
        }
        let phone = contact.phone.clone();
        self.order.push(phone.clone());
        self.nodes.insert(phone, ContactNode { contact, superior });
        true
    }

    /// Remove a contact; its subordinates lose their superior
    pub fn remove_contact(&mut self, phone: &str) -> bool {
        if self.nodes.remove(phone).is_none() {
            return false;
        }
        self.order.retain(|p| p != phone);
        for node in self.nodes.values_mut() {
            if node.superior.as_deref() == Some(phone) {
                node.superior = None;
            }
        }
        true
    }

    pub fn get(&self, phone: &str) -> Option<&Contact> {
        self.nodes.get(phone).map(|n| &n.contact)
    }

    /// Direct subordinates in insertion order
    pub fn subordinates(&self, phone: &str) -> Vec<Contact> {
        self.order
            .iter()
            .filter_map(|p| self.nodes.get(p))
            .filter(|n| n.superior.as_deref() == Some(phone))
            .map(|n| n.contact.clone())
            .collect()
    }

    /// Escalation tree below `phone`, cut wherever a contact repeats on the path
    pub fn escalation_tree(&self, phone: &str) -> Option<EscalationTree> {
        let mut path = Vec::new();
        self.build_tree_node(phone, &mut path)
    }

    fn build_tree_node(&self, phone: &str, path: &mut Vec<String>) -> Option<EscalationTree> {
        let contact = self.get(phone)?.clone();
        path.push(phone.to_string());

        let mut subordinates = Vec::new();
        for sub in self.subordinates(phone) {
            if path.contains(&sub.phone) {
                continue;
            }
            if let Some(node) = self.build_tree_node(&sub.phone, path) {
                subordinates.push(node);
            }
        }

        path.pop();
        Some(EscalationTree {
            contact,
            subordinates,
        })
    }

    /// Get total contact count
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if hierarchy is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Shared in-memory directory
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    inner: Arc<RwLock<ContactHierarchy>>,
}

impl InMemoryDirectory {
    pub fn new(hierarchy: ContactHierarchy) -> Self {
        Self {
            inner: Arc::new(RwLock::new(hierarchy)),
        }
    }

    pub fn from_entries(entries: &[ContactEntry]) -> Self {
        Self::new(ContactHierarchy::from_entries(entries))
    }

    pub fn add_contact(&self, contact: Contact, superior: Option<&str>) -> bool {
        self.inner
            .write()
            .add_contact(contact, superior.map(str::to_string))
    }

    pub fn remove_contact(&self, phone: &str) -> bool {
        self.inner.write().remove_contact(phone)
    }

    pub fn escalation_tree(&self, phone: &str) -> Option<EscalationTree> {
        self.inner.read().escalation_tree(phone)
    }
}

#[async_trait]
impl ContactDirectory for InMemoryDirectory {
    async fn subordinate_count(&self, phone: &str) -> Result<usize, DirectoryError> {
        let hierarchy = self.inner.read();
        if hierarchy.get(phone).is_none() {
            return Err(DirectoryError::UnknownContact(phone.to_string()));
        }
        Ok(hierarchy.subordinates(phone).len())
    }

    async fn subordinates_of(&self, phone: &str) -> Result<Vec<Contact>, DirectoryError> {
        let hierarchy = self.inner.read();
        if hierarchy.get(phone).is_none() {
            return Err(DirectoryError::UnknownContact(phone.to_string()));
        }
        Ok(hierarchy.subordinates(phone))
    }
}
