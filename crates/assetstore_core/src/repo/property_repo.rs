//! Property repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Upsert, read and remove namespaced media package properties.
//! - Answer equality checks used by property predicates.
//!
//! # Invariants
//! - At most one value per `(media_package_id, namespace, name)`.
//! - Stored `value_type` decides which value column is populated.

use crate::model::property::{Property, PropertyName, PropertyValue};
use crate::model::snapshot::{validate_owner, MediaPackageId};
use crate::repo::{bool_to_int, ensure_schema_ready, int_to_bool, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};

const PROPERTY_SELECT_SQL: &str = "SELECT
    media_package_id,
    namespace,
    name,
    value_type,
    text_value,
    int_value
FROM properties";

/// Repository interface for media package properties.
pub trait PropertyRepository {
    /// Inserts or replaces one property value.
    fn upsert_property(&self, property: &Property) -> RepoResult<()>;
    /// Loads one property value.
    fn get_property(
        &self,
        media_package_id: &MediaPackageId,
        name: &PropertyName,
    ) -> RepoResult<Option<PropertyValue>>;
    /// Returns whether the stored value equals `value`.
    fn matches_property(
        &self,
        media_package_id: &MediaPackageId,
        name: &PropertyName,
        value: &PropertyValue,
    ) -> RepoResult<bool>;
    /// Lists all properties of one package ordered by namespace and name.
    fn list_properties(&self, media_package_id: &MediaPackageId) -> RepoResult<Vec<Property>>;
    /// Lists properties of every package that has a snapshot of `owner`.
    fn list_owner_properties(&self, owner: &str) -> RepoResult<Vec<Property>>;
    /// Removes properties of one package, optionally limited to a namespace.
    fn delete_properties(
        &self,
        media_package_id: &MediaPackageId,
        namespace: Option<&str>,
    ) -> RepoResult<usize>;
}

/// SQLite-backed property repository.
pub struct SqlitePropertyRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePropertyRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }
}

impl PropertyRepository for SqlitePropertyRepository<'_> {
    fn upsert_property(&self, property: &Property) -> RepoResult<()> {
        property.validate()?;
        let (text_value, int_value) = value_to_db(&property.value);

        self.conn.execute(
            "INSERT INTO properties (
                media_package_id,
                namespace,
                name,
                value_type,
                text_value,
                int_value
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(media_package_id, namespace, name)
            DO UPDATE SET
                value_type = excluded.value_type,
                text_value = excluded.text_value,
                int_value = excluded.int_value,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                property.media_package_id.as_str(),
                property.name.namespace.as_str(),
                property.name.name.as_str(),
                property.value.type_tag(),
                text_value,
                int_value,
            ],
        )?;
        Ok(())
    }

    fn get_property(
        &self,
        media_package_id: &MediaPackageId,
        name: &PropertyName,
    ) -> RepoResult<Option<PropertyValue>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PROPERTY_SELECT_SQL}
             WHERE media_package_id = ?1
               AND namespace = ?2
               AND name = ?3;"
        ))?;
        let mut rows = stmt.query(params![
            media_package_id.as_str(),
            name.namespace.as_str(),
            name.name.as_str(),
        ])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_property_row(row)?.value));
        }
        Ok(None)
    }

    fn matches_property(
        &self,
        media_package_id: &MediaPackageId,
        name: &PropertyName,
        value: &PropertyValue,
    ) -> RepoResult<bool> {
        Ok(self.get_property(media_package_id, name)?.as_ref() == Some(value))
    }

    fn list_properties(&self, media_package_id: &MediaPackageId) -> RepoResult<Vec<Property>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PROPERTY_SELECT_SQL}
             WHERE media_package_id = ?1
             ORDER BY namespace ASC, name ASC;"
        ))?;
        let mut rows = stmt.query([media_package_id.as_str()])?;
        let mut properties = Vec::new();
        while let Some(row) = rows.next()? {
            properties.push(parse_property_row(row)?);
        }
        Ok(properties)
    }

    fn list_owner_properties(&self, owner: &str) -> RepoResult<Vec<Property>> {
        let owner = validate_owner(owner)?;
        let mut stmt = self.conn.prepare(&format!(
            "{PROPERTY_SELECT_SQL}
             WHERE media_package_id IN (
                SELECT DISTINCT media_package_id FROM snapshots WHERE owner = ?1
             )
             ORDER BY media_package_id ASC, namespace ASC, name ASC;"
        ))?;
        let mut rows = stmt.query([owner])?;
        let mut properties = Vec::new();
        while let Some(row) = rows.next()? {
            properties.push(parse_property_row(row)?);
        }
        Ok(properties)
    }

    fn delete_properties(
        &self,
        media_package_id: &MediaPackageId,
        namespace: Option<&str>,
    ) -> RepoResult<usize> {
        let removed = match namespace {
            Some(namespace) => self.conn.execute(
                "DELETE FROM properties WHERE media_package_id = ?1 AND namespace = ?2;",
                params![media_package_id.as_str(), namespace],
            )?,
            None => self.conn.execute(
                "DELETE FROM properties WHERE media_package_id = ?1;",
                [media_package_id.as_str()],
            )?,
        };
        Ok(removed)
    }
}

fn value_to_db(value: &PropertyValue) -> (Option<&str>, Option<i64>) {
    match value {
        PropertyValue::String(text) => (Some(text.as_str()), None),
        PropertyValue::Long(number) | PropertyValue::Date(number) => (None, Some(*number)),
        PropertyValue::Boolean(flag) => (None, Some(bool_to_int(*flag))),
    }
}

fn parse_property_row(row: &Row<'_>) -> RepoResult<Property> {
    let value_type: String = row.get("value_type")?;
    let text_value: Option<String> = row.get("text_value")?;
    let int_value: Option<i64> = row.get("int_value")?;

    let value = match (value_type.as_str(), text_value, int_value) {
        ("string", Some(text), _) => PropertyValue::String(text),
        ("long", _, Some(number)) => PropertyValue::Long(number),
        ("date", _, Some(number)) => PropertyValue::Date(number),
        ("boolean", _, Some(flag)) => {
            PropertyValue::Boolean(int_to_bool(flag, "properties.int_value")?)
        }
        (other, _, _) => {
            return Err(RepoError::InvalidData(format!(
                "property value of type `{other}` has no matching value column"
            )));
        }
    };

    Ok(Property {
        media_package_id: MediaPackageId::new(row.get::<_, String>("media_package_id")?),
        name: PropertyName::new(
            row.get::<_, String>("namespace")?,
            row.get::<_, String>("name")?,
        ),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::{PropertyRepository, SqlitePropertyRepository};
    use crate::db::open_db_in_memory;
    use crate::model::property::{PropertyName, PropertyValue};
    use crate::model::snapshot::MediaPackageId;
    use crate::repo::RepoError;

    #[test]
    fn upsert_replaces_value_and_type() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqlitePropertyRepository::try_new(&conn).unwrap();
        let id = MediaPackageId::new("mp-1");
        let name = PropertyName::new("org.test", "count");

        repo.upsert_property(&name.property(&id, "one")).unwrap();
        repo.upsert_property(&name.property(&id, 1_i64)).unwrap();

        assert_eq!(
            repo.get_property(&id, &name).unwrap(),
            Some(PropertyValue::Long(1))
        );
        assert_eq!(repo.list_properties(&id).unwrap().len(), 1);
    }

    #[test]
    fn matches_property_is_type_aware() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqlitePropertyRepository::try_new(&conn).unwrap();
        let id = MediaPackageId::new("mp-1");
        let start = PropertyName::new("org.test", "start");

        repo.upsert_property(&start.property(&id, PropertyValue::Date(1_000)))
            .unwrap();

        assert!(repo
            .matches_property(&id, &start, &PropertyValue::Date(1_000))
            .unwrap());
        assert!(!repo
            .matches_property(&id, &start, &PropertyValue::Long(1_000))
            .unwrap());
    }

    #[test]
    fn boolean_values_roundtrip() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqlitePropertyRepository::try_new(&conn).unwrap();
        let id = MediaPackageId::new("mp-1");
        let flag = PropertyName::new("org.test", "published");

        repo.upsert_property(&flag.property(&id, true)).unwrap();
        assert_eq!(
            repo.get_property(&id, &flag).unwrap(),
            Some(PropertyValue::Boolean(true))
        );
    }

    #[test]
    fn delete_properties_can_target_one_namespace() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqlitePropertyRepository::try_new(&conn).unwrap();
        let id = MediaPackageId::new("mp-1");

        repo.upsert_property(&PropertyName::new("a", "x").property(&id, "1"))
            .unwrap();
        repo.upsert_property(&PropertyName::new("b", "y").property(&id, "2"))
            .unwrap();

        assert_eq!(repo.delete_properties(&id, Some("a")).unwrap(), 1);
        assert_eq!(repo.list_properties(&id).unwrap().len(), 1);
        assert_eq!(repo.delete_properties(&id, None).unwrap(), 1);
        assert!(repo.list_properties(&id).unwrap().is_empty());
    }

    #[test]
    fn upsert_rejects_invalid_namespace() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqlitePropertyRepository::try_new(&conn).unwrap();
        let err = repo
            .upsert_property(&PropertyName::new("bad ns", "x").property("mp-1", "1"))
            .unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));
    }
}
