//! In-memory store
//!
//! Implements both repositories over a single mutex-guarded table set.
//! Used for local development without PostgreSQL and by the test suites.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{
    Contact, ContactDraft, ContactQuery, ContactRepository, ContactsError, NewUser, Result, Role,
    User, UserRepository,
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    contacts: BTreeMap<i64, Contact>,
    next_user_id: i64,
    next_contact_id: i64,
}

impl Tables {
    fn user_by_email_mut(&mut self, email: &str) -> Option<&mut User> {
        self.users.values_mut().find(|u| u.email == email)
    }
}

/// Process-local store with the same semantics as [`crate::PgStore`]
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn page(contacts: impl Iterator<Item = Contact>, query: &ContactQuery) -> Vec<Contact> {
    contacts
        .filter(|c| query.matches(c))
        .skip(query.offset as usize)
        .take(query.limit as usize)
        .collect()
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.lock().users.values().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut tables = self.lock();
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(ContactsError::Conflict(format!(
                "email {} already registered",
                user.email
            )));
        }

        tables.next_user_id += 1;
        let now = Utc::now();
        let created = User {
            id: tables.next_user_id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            confirmed: false,
            refresh_token: None,
            avatar: user.avatar,
            role: Role::User,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_refresh_token(&self, user_id: i64, token: Option<&str>) -> Result<()> {
        if let Some(user) = self.lock().users.get_mut(&user_id) {
            user.refresh_token = token.map(str::to_string);
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        user_id: i64,
        presented: &str,
        replacement: &str,
    ) -> Result<bool> {
        let mut tables = self.lock();
        match tables.users.get_mut(&user_id) {
            Some(user) if user.refresh_token.as_deref() == Some(presented) => {
                user.refresh_token = Some(replacement.to_string());
                user.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn confirm_email(&self, email: &str) -> Result<()> {
        let mut tables = self.lock();
        let user = tables
            .user_by_email_mut(email)
            .ok_or_else(|| ContactsError::NotFound(format!("user {email}")))?;
        user.confirmed = true;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn update_avatar(&self, email: &str, url: Option<&str>) -> Result<User> {
        let mut tables = self.lock();
        let user = tables
            .user_by_email_mut(email)
            .ok_or_else(|| ContactsError::NotFound(format!("user {email}")))?;
        user.avatar = url.map(str::to_string);
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn set_role(&self, email: &str, role: Role) -> Result<User> {
        let mut tables = self.lock();
        let user = tables
            .user_by_email_mut(email)
            .ok_or_else(|| ContactsError::NotFound(format!("user {email}")))?;
        user.role = role;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ContactRepository for MemoryStore {
    async fn list_contacts(&self, owner_id: i64, query: &ContactQuery) -> Result<Vec<Contact>> {
        let tables = self.lock();
        let owned = tables
            .contacts
            .values()
            .filter(|c| c.user_id == owner_id)
            .cloned();
        Ok(page(owned, query))
    }

    async fn list_all(&self, query: &ContactQuery) -> Result<Vec<Contact>> {
        let tables = self.lock();
        Ok(page(tables.contacts.values().cloned(), query))
    }

    async fn get_contact(&self, owner_id: i64, contact_id: i64) -> Result<Option<Contact>> {
        Ok(self
            .lock()
            .contacts
            .get(&contact_id)
            .filter(|c| c.user_id == owner_id)
            .cloned())
    }

    async fn create_contact(&self, owner_id: i64, draft: ContactDraft) -> Result<Contact> {
        let mut tables = self.lock();
        if !tables.users.contains_key(&owner_id) {
            return Err(ContactsError::NotFound(format!("user {owner_id}")));
        }

        tables.next_contact_id += 1;
        let now = Utc::now();
        let contact = Contact {
            id: tables.next_contact_id,
            user_id: owner_id,
            name: draft.name,
            lastname: draft.lastname,
            email: draft.email,
            phone: draft.phone,
            birthdate: draft.birthdate,
            others_info: draft.others_info,
            completed: draft.completed,
            created_at: now,
            updated_at: now,
        };
        tables.contacts.insert(contact.id, contact.clone());
        Ok(contact)
    }

    async fn update_contact(
        &self,
        owner_id: i64,
        contact_id: i64,
        draft: ContactDraft,
    ) -> Result<Option<Contact>> {
        let mut tables = self.lock();
        let Some(contact) = tables
            .contacts
            .get_mut(&contact_id)
            .filter(|c| c.user_id == owner_id)
        else {
            return Ok(None);
        };

        contact.name = draft.name;
        contact.lastname = draft.lastname;
        contact.email = draft.email;
        contact.phone = draft.phone;
        contact.birthdate = draft.birthdate;
        contact.others_info = draft.others_info;
        contact.completed = draft.completed;
        contact.updated_at = Utc::now();
        Ok(Some(contact.clone()))
    }

    async fn delete_contact(&self, owner_id: i64, contact_id: i64) -> Result<Option<Contact>> {
        let mut tables = self.lock();
        let owned = tables
            .contacts
            .get(&contact_id)
            .is_some_and(|c| c.user_id == owner_id);
        Ok(if owned {
            tables.contacts.remove(&contact_id)
        } else {
            None
        })
    }
}
