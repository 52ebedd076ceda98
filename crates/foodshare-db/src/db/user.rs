use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;
use validator::Validate;

use foodshare_core::models::{NewUser, User};
use foodshare_core::{AppError, StoreResultExt};

use crate::db::is_unique_violation;
use crate::store::UserDirectory;

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for UserRepository {
    #[tracing::instrument(skip(self, user), fields(email = %user.email))]
    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        user.validate()?;

        let created: User = sqlx::query_as::<Postgres, User>(
            r#"
            INSERT INTO users (
                id, surname, name, patronymic, date_of_birth, phone_number, email, city_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING
                id,
                surname,
                name,
                patronymic,
                date_of_birth,
                phone_number,
                email,
                city_id,
                created_at,
                updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.surname)
        .bind(&user.name)
        .bind(&user.patronymic)
        .bind(user.date_of_birth)
        .bind(&user.phone_number)
        .bind(&user.email)
        .bind(user.city_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::InvalidInput(format!("Email {} is already registered", user.email))
            } else {
                AppError::store_failure("create_user", &user.email, e)
            }
        })?;

        tracing::info!(user_id = %created.id, "User created");

        Ok(created)
    }

    #[tracing::instrument(skip(self))]
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        sqlx::query_as::<Postgres, User>(
            r#"
            SELECT
                id,
                surname,
                name,
                patronymic,
                date_of_birth,
                phone_number,
                email,
                city_id,
                created_at,
                updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .store_context("get_user", id)
    }

    #[tracing::instrument(skip(self))]
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<Postgres, User>(
            r#"
            SELECT
                id,
                surname,
                name,
                patronymic,
                date_of_birth,
                phone_number,
                email,
                city_id,
                created_at,
                updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .store_context("get_user_by_email", email)
    }
}
