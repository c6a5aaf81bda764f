// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed user repository.
//!
//! Users live in `users/{user_id}` as flat documents; avatar metadata in
//! `media/{user_id}`. Firestore has no unique indexes, so email and username
//! uniqueness rests on the existence checks made before sign-up.

use super::{collections, DbError, UserRepository, UserTx};
use crate::models::{Credential, Gender, MediaObject, User};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored shape of a user document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDoc {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub bio: String,
    pub gender: Gender,
    pub created_at: String,
    #[serde(default)]
    pub is_superuser: bool,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl From<&User> for UserDoc {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username.clone(),
            bio: user.bio.clone(),
            gender: user.gender,
            created_at: user.created_at.clone(),
            is_superuser: user.is_superuser,
            email: user.credential.email.clone(),
            password_hash: user.credential.password_hash.clone(),
            avatar: user.avatar.clone(),
        }
    }
}

impl TryFrom<UserDoc> for User {
    type Error = DbError;

    fn try_from(doc: UserDoc) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&doc.id)
            .map_err(|_| DbError::Backend(format!("user document has bad id {}", doc.id)))?;
        Ok(User {
            id,
            username: doc.username,
            bio: doc.bio,
            gender: doc.gender,
            created_at: doc.created_at,
            is_superuser: doc.is_superuser,
            credential: Credential {
                email: doc.email,
                password_hash: doc.password_hash,
            },
            avatar: doc.avatar,
        })
    }
}

fn backend(context: &str, err: impl std::fmt::Display) -> DbError {
    DbError::Backend(format!("{context}: {err}"))
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, DbError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| backend("Failed to connect to Firestore", e))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, DbError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| backend("Failed to connect to Firestore Emulator", e))?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Offline client; every operation fails with a backend error.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, DbError> {
        self.client
            .as_ref()
            .ok_or_else(|| DbError::Backend("Database not connected (offline mode)".to_string()))
    }

    async fn find_one_by(&self, field: &str, value: &str) -> Result<Option<User>, DbError> {
        let docs: Vec<UserDoc> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(|q| q.for_all([q.field(field).eq(value)]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| backend("User query failed", e))?;

        docs.into_iter().next().map(User::try_from).transpose()
    }

    async fn get_doc(&self, user_id: Uuid) -> Result<Option<UserDoc>, DbError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(&user_id.to_string())
            .await
            .map_err(|e| backend("User lookup failed", e))
    }
}

#[async_trait]
impl UserRepository for FirestoreDb {
    async fn begin_tx(&self) -> Result<Box<dyn UserTx>, DbError> {
        let client = self.get_client()?.clone();
        Ok(Box::new(FirestoreTx {
            client,
            users: Vec::new(),
            media: Vec::new(),
        }))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        self.find_one_by("email", email).await
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        self.find_one_by("username", username).await
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, DbError> {
        self.get_doc(user_id).await?.map(User::try_from).transpose()
    }

    async fn update_user_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), DbError> {
        let mut doc = self.get_doc(user_id).await?.ok_or(DbError::NotFound)?;
        doc.password_hash = password_hash.to_string();

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&doc.id)
            .object(&doc)
            .execute()
            .await
            .map_err(|e| backend("Password update failed", e))?;

        tracing::debug!(user_id = %user_id, "Stored new password hash");
        Ok(())
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), DbError> {
        if self.get_doc(user_id).await?.is_none() {
            return Err(DbError::NotFound);
        }

        let client = self.get_client()?;
        let doc_id = user_id.to_string();
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| backend("Failed to begin transaction", e))?;

        for collection in [collections::MEDIA, collections::USERS] {
            client
                .fluent()
                .delete()
                .from(collection)
                .document_id(&doc_id)
                .add_to_transaction(&mut transaction)
                .map_err(|e| backend("Failed to add deletion to transaction", e))?;
        }

        transaction
            .commit()
            .await
            .map_err(|e| backend("Failed to commit user deletion", e))?;

        tracing::info!(user_id = %user_id, "Deleted user document");
        Ok(())
    }
}

/// Buffered sign-up writes, applied in one Firestore transaction on commit.
struct FirestoreTx {
    client: firestore::FirestoreDb,
    users: Vec<UserDoc>,
    media: Vec<MediaObject>,
}

#[async_trait]
impl UserTx for FirestoreTx {
    fn create_user(&mut self, user: &User) -> Result<(), DbError> {
        self.users.push(UserDoc::from(user));
        Ok(())
    }

    fn attach_avatar(&mut self, user_id: Uuid, media: &MediaObject) -> Result<(), DbError> {
        let id = user_id.to_string();
        let doc = self
            .users
            .iter_mut()
            .find(|doc| doc.id == id)
            .ok_or(DbError::NotFound)?;
        doc.avatar = Some(media.url.clone());
        self.media.push(media.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        let client = &self.client;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| backend("Failed to begin transaction", e))?;

        for doc in &self.users {
            client
                .fluent()
                .update()
                .in_col(collections::USERS)
                .document_id(&doc.id)
                .object(doc)
                .add_to_transaction(&mut transaction)
                .map_err(|e| backend("Failed to add user to transaction", e))?;
        }

        for object in &self.media {
            client
                .fluent()
                .update()
                .in_col(collections::MEDIA)
                .document_id(object.user_id.to_string())
                .object(object)
                .add_to_transaction(&mut transaction)
                .map_err(|e| backend("Failed to add media to transaction", e))?;
        }

        transaction
            .commit()
            .await
            .map_err(|e| backend("Transaction commit failed", e))?;

        tracing::debug!(users = self.users.len(), "Sign-up transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        // Nothing reached Firestore yet.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            bio: "hi".to_string(),
            gender: Gender::Female,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            is_superuser: false,
            credential: Credential {
                email: "alice@x.com".to_string(),
                password_hash: "$argon2id$stub".to_string(),
            },
            avatar: None,
        }
    }

    #[test]
    fn user_doc_roundtrip() {
        let user = sample_user();
        let doc = UserDoc::from(&user);
        assert_eq!(doc.id, user.id.to_string());
        assert_eq!(doc.email, "alice@x.com");

        let back = User::try_from(doc).unwrap();
        assert_eq!(back.id, user.id);
        assert_eq!(back.credential.password_hash, user.credential.password_hash);
    }

    #[test]
    fn user_doc_with_bad_id_is_backend_error() {
        let mut doc = UserDoc::from(&sample_user());
        doc.id = "not-a-uuid".to_string();
        assert!(matches!(User::try_from(doc), Err(DbError::Backend(_))));
    }

    #[tokio::test]
    async fn offline_client_reports_backend_error() {
        let db = FirestoreDb::new_mock();
        assert!(matches!(
            db.get_user_by_email("alice@x.com").await,
            Err(DbError::Backend(_))
        ));
        assert!(matches!(db.begin_tx().await, Err(DbError::Backend(_))));
    }
}
