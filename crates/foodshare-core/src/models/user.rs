use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct User {
    pub id: Uuid,
    pub surname: String,
    pub name: String,
    pub patronymic: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub phone_number: Option<String>,
    pub email: String,
    pub city_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn full_name(&self) -> String {
        match &self.patronymic {
            Some(p) if !p.is_empty() => format!("{} {} {}", self.surname, self.name, p),
            _ => format!("{} {}", self.surname, self.name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewUser {
    #[validate(length(min = 1, max = 255))]
    pub surname: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub patronymic: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    #[validate(length(max = 32))]
    pub phone_number: Option<String>,
    #[validate(email)]
    pub email: String,
    pub city_id: Option<Uuid>,
}
