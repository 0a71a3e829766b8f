use anyhow::Result;
use rusqlite::{Connection, Row, types::Type};

use crate::models::{NewUser, ProfileUpdate, UserRow};
use crate::{Database, OptionalExt, now_timestamp};

const USER_COLUMNS: &str = "id, username, email, bio, avatar_url, github_link, skills, \
                            reputation_points, created_at, updated_at";

impl Database {
    pub fn create_user(&self, user: &NewUser<'_>) -> Result<()> {
        let skills = serde_json::to_string(user.skills)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, bio, avatar_url, github_link, skills, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                rusqlite::params![
                    user.id,
                    user.username,
                    user.email,
                    user.bio,
                    user.avatar_url,
                    user.github_link,
                    skills,
                    user.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    /// Applies the set fields of `update`. Returns false if the user does not exist.
    pub fn update_profile(&self, id: &str, update: &ProfileUpdate<'_>) -> Result<bool> {
        let skills = update.skills.map(serde_json::to_string).transpose()?;
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET
                    bio = COALESCE(?2, bio),
                    avatar_url = COALESCE(?3, avatar_url),
                    github_link = COALESCE(?4, github_link),
                    skills = COALESCE(?5, skills),
                    updated_at = ?6
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    update.bio,
                    update.avatar_url,
                    update.github_link,
                    skills,
                    now_timestamp(),
                ],
            )?;
            Ok(changed > 0)
        })
    }
}

// `column` is always one of the literals above, never caller input.
fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([value], map_user).optional()
}

pub(crate) fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    let skills_json: String = row.get(6)?;
    let skills = serde_json::from_str(&skills_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        bio: row.get(3)?,
        avatar_url: row.get(4)?,
        github_link: row.get(5)?,
        skills,
        reputation_points: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::is_constraint_violation;

    /// Inserts a bare user and returns its id.
    pub(crate) fn seed_user(db: &Database, username: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let email = format!("{username}@example.com");
        db.create_user(&NewUser {
            id: &id,
            username,
            email: &email,
            bio: None,
            avatar_url: None,
            github_link: None,
            skills: &[],
            created_at: &now_timestamp(),
        })
        .unwrap();
        id
    }

    #[test]
    fn create_and_lookup_user() {
        let db = Database::open_in_memory().unwrap();
        let skills = vec!["rust".to_string(), "sql".to_string()];
        db.create_user(&NewUser {
            id: "u-1",
            username: "alice",
            email: "alice@example.com",
            bio: Some("backend dev"),
            avatar_url: None,
            github_link: Some("https://github.com/alice"),
            skills: &skills,
            created_at: &now_timestamp(),
        })
        .unwrap();

        let by_name = db.get_user_by_username("alice").unwrap().unwrap();
        assert_eq!(by_name.id, "u-1");
        assert_eq!(by_name.skills, skills);
        assert_eq!(by_name.reputation_points, 0);

        let by_email = db.get_user_by_email("alice@example.com").unwrap().unwrap();
        assert_eq!(by_email.username, "alice");

        assert!(db.get_user_by_id("missing").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_is_constraint_violation() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "alice");

        let err = db
            .create_user(&NewUser {
                id: "other",
                username: "alice",
                email: "different@example.com",
                bio: None,
                avatar_url: None,
                github_link: None,
                skills: &[],
                created_at: &now_timestamp(),
            })
            .unwrap_err();
        assert!(is_constraint_violation(&err));
    }

    #[test]
    fn profile_update_keeps_unset_fields() {
        let db = Database::open_in_memory().unwrap();
        let id = seed_user(&db, "bob");

        let skills = vec!["design".to_string()];
        let updated = db
            .update_profile(
                &id,
                &ProfileUpdate {
                    bio: Some("hello"),
                    skills: Some(&skills),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(updated);

        db.update_profile(
            &id,
            &ProfileUpdate {
                avatar_url: Some("https://cdn/bob.png"),
                ..Default::default()
            },
        )
        .unwrap();

        let user = db.get_user_by_id(&id).unwrap().unwrap();
        assert_eq!(user.bio.as_deref(), Some("hello"));
        assert_eq!(user.avatar_url.as_deref(), Some("https://cdn/bob.png"));
        assert_eq!(user.skills, skills);

        assert!(!db.update_profile("nobody", &ProfileUpdate::default()).unwrap());
    }
}
