use anyhow::Result;
use rust_simple_access::{
    parse_enum, ConversionError, Entity, Error, Executor, MetadataCache, Params, Property,
    SimpleAccess, SqliteConfig, Value,
};
use serde::Serialize;
use std::{str::FromStr, sync::Arc};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Status {
    Active,
    Suspended,
}

impl FromStr for Status {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(Status::Active),
            "Suspended" => Ok(Status::Suspended),
            _ => Err(ConversionError::InvalidEnum {
                enum_name: "Status",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct User {
    id: i64,
    name: String,
    email: String,
    age: Option<i32>,
    status: Option<Status>,
}

impl Entity for User {
    fn properties() -> Vec<Property<Self>> {
        vec![
            Property::new("Id", |user: &mut User, value| {
                user.id = value.decode()?;
                Ok(())
            }),
            Property::new("Name", |user: &mut User, value| {
                user.name = value.decode()?;
                Ok(())
            }),
            Property::new("Email", |user: &mut User, value| {
                user.email = value.decode()?;
                Ok(())
            })
            .column("email_address"),
            Property::new("Age", |user: &mut User, value| {
                user.age = value.decode()?;
                Ok(())
            }),
            Property::nullable_enum("Status", |user: &mut User, value| {
                user.status = parse_enum(value)?;
                Ok(())
            }),
        ]
    }
}

#[derive(Serialize)]
struct NewUser<'a> {
    name: &'a str,
    email: &'a str,
    age: Option<i32>,
    status: Option<&'a str>,
}

// Route library logs to the test output; RUST_LOG controls the level
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Helper function to create an in-memory database for testing
fn create_test_db() -> Result<SimpleAccess> {
    init_tracing();
    let access = SimpleAccess::open(&SqliteConfig::in_memory())?;
    initialize_schema(&access)?;
    Ok(access)
}

// Helper function to create a temporary file-based database
fn create_temp_db() -> Result<(SimpleAccess, NamedTempFile)> {
    init_tracing();
    let temp_file = NamedTempFile::new()?;
    let path = temp_file.path().to_str().unwrap().to_string();
    let config = SqliteConfig::new(path)
        .with_busy_timeout(std::time::Duration::from_millis(500))
        .with_foreign_keys(true);
    let access = SimpleAccess::open(&config)?;
    initialize_schema(&access)?;
    Ok((access, temp_file))
}

// Initialize the database schema
fn initialize_schema(access: &SimpleAccess) -> Result<()> {
    access.connection().execute_batch(
        r#"
        CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT UNIQUE NOT NULL,
            age INTEGER,
            status TEXT
        );
        CREATE INDEX idx_users_email ON users(email);
        "#,
    )?;
    Ok(())
}

fn insert_user(access: &impl Executor, user: &NewUser<'_>) -> Result<usize> {
    Ok(access.execute_non_query(
        "INSERT INTO users (name, email, age, status) VALUES (:name, :email, :age, :status)",
        &Params::from_serialize(user)?,
    )?)
}

fn seed_users(access: &SimpleAccess) -> Result<()> {
    insert_user(
        access,
        &NewUser {
            name: "John Doe",
            email: "john@example.com",
            age: Some(30),
            status: Some("Active"),
        },
    )?;
    insert_user(
        access,
        &NewUser {
            name: "Jane Roe",
            email: "jane@example.com",
            age: None,
            status: None,
        },
    )?;
    Ok(())
}

#[tokio::test]
async fn test_basic_operations() {
    test_basic_operations_impl().unwrap();
}

fn test_basic_operations_impl() -> Result<()> {
    let access = create_test_db()?;

    let inserted = access.execute_non_query(
        "INSERT INTO users (name, email, age) VALUES (:name, :email, :age)",
        &Params::new()
            .with_value("name", "John Doe")
            .with_value("email", "john@example.com")
            .with_value("age", 30),
    )?;
    assert_eq!(inserted, 1);

    let by_id = Params::new().with_value("id", 1);
    let user: Option<User> = access.execute_entity(
        "SELECT id, name, email, age, status FROM users WHERE id = :id",
        &by_id,
        None,
    )?;
    let user = user.expect("user 1 exists");
    assert_eq!(user.name, "John Doe");
    assert_eq!(user.email, "john@example.com");
    assert_eq!(user.age, Some(30));
    assert_eq!(user.status, None);

    access.execute_non_query(
        "UPDATE users SET age = :age WHERE id = :id",
        &by_id.clone().with_value("age", 31),
    )?;
    let updated_age: Option<i32> =
        access.execute_scalar("SELECT age FROM users WHERE id = :id", &by_id)?;
    assert_eq!(updated_age, Some(31));

    access.execute_non_query("DELETE FROM users WHERE id = :id", &by_id)?;
    let deleted: Option<User> = access.execute_entity(
        "SELECT id, name, email, age FROM users WHERE id = :id",
        &by_id,
        None,
    )?;
    assert!(deleted.is_none());

    let missing: Option<i64> =
        access.execute_scalar("SELECT age FROM users WHERE id = :id", &by_id)?;
    assert_eq!(missing, None);

    Ok(())
}

#[tokio::test]
async fn test_entities_in_row_order() {
    test_entities_in_row_order_impl().unwrap();
}

fn test_entities_in_row_order_impl() -> Result<()> {
    let access = create_test_db()?;
    seed_users(&access)?;

    let users: Vec<User> = access.execute_entities(
        "SELECT ID, NAME, EMAIL, AGE, STATUS FROM users ORDER BY id",
        &Params::new(),
        None,
    )?;

    assert_eq!(
        users,
        vec![
            User {
                id: 1,
                name: "John Doe".into(),
                email: "john@example.com".into(),
                age: Some(30),
                status: Some(Status::Active),
            },
            User {
                id: 2,
                name: "Jane Roe".into(),
                email: "jane@example.com".into(),
                age: None,
                status: None,
            },
        ]
    );

    let none: Vec<User> = access.execute_entities(
        "SELECT * FROM users WHERE id > :id",
        &Params::new().with_value("id", 10),
        None,
    )?;
    assert!(none.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_skip_fields_and_column_alias() {
    test_skip_fields_and_column_alias_impl().unwrap();
}

fn test_skip_fields_and_column_alias_impl() -> Result<()> {
    let access = create_test_db()?;
    seed_users(&access)?;

    let user: Option<User> = access.execute_entity(
        "SELECT id, name, email AS email_address FROM users WHERE id = 1",
        &Params::new(),
        None,
    )?;
    assert_eq!(user.map(|u| u.email), Some("john@example.com".to_string()));

    let user: Option<User> = access.execute_entity(
        "SELECT id, name, email, age FROM users WHERE id = 1",
        &Params::new(),
        Some("email, Age"),
    )?;
    let user = user.expect("user 1 exists");
    assert_eq!(user.name, "John Doe");
    assert_eq!(user.email, "");
    assert_eq!(user.age, None);

    Ok(())
}

#[tokio::test]
async fn test_mapping_errors_name_the_property() {
    test_mapping_errors_name_the_property_impl().unwrap();
}

fn test_mapping_errors_name_the_property_impl() -> Result<()> {
    let access = create_test_db()?;
    seed_users(&access)?;
    access.execute_non_query(
        "UPDATE users SET status = 'Retired' WHERE id = 2",
        &Params::new(),
    )?;

    let err = access
        .execute_entities::<User>("SELECT id, status FROM users", &Params::new(), None)
        .unwrap_err();
    assert!(matches!(err, Error::PropertyWrite { property: "Status", .. }));

    let err = access
        .execute_entity::<User>("SELECT name AS id FROM users", &Params::new(), None)
        .unwrap_err();
    assert!(matches!(err, Error::PropertyWrite { property: "Id", .. }));

    Ok(())
}

#[tokio::test]
async fn test_transactions() {
    test_transactions_impl().unwrap();
}

fn test_transactions_impl() -> Result<()> {
    let mut access = create_test_db()?;
    let count = "SELECT COUNT(*) FROM users";
    let user = NewUser {
        name: "Tx User",
        email: "tx@example.com",
        age: None,
        status: Some("Suspended"),
    };

    let tx = access.begin_transaction()?;
    insert_user(&tx, &user)?;
    let inside: i64 = tx.execute_scalar(count, &Params::new())?;
    assert_eq!(inside, 1);
    tx.end(false)?;
    assert_eq!(access.execute_scalar::<i64>(count, &Params::new())?, 0);

    {
        let tx = access.begin_transaction()?;
        insert_user(&tx, &user)?;
    }
    assert_eq!(access.execute_scalar::<i64>(count, &Params::new())?, 0);

    let tx = access.begin_transaction()?;
    insert_user(&tx, &user)?;
    let stored: Option<User> =
        tx.execute_entity("SELECT * FROM users", &Params::new(), None)?;
    assert_eq!(stored.and_then(|u| u.status), Some(Status::Suspended));
    tx.end(true)?;
    assert_eq!(access.execute_scalar::<i64>(count, &Params::new())?, 1);

    Ok(())
}

#[tokio::test]
async fn test_file_database() {
    test_file_database_impl().unwrap();
}

fn test_file_database_impl() -> Result<()> {
    let (access, temp_file) = create_temp_db()?;
    seed_users(&access)?;
    access.close()?;

    let reopened = SimpleAccess::open(&SqliteConfig::new(
        temp_file.path().to_str().unwrap(),
    ))?;
    let total: i64 = reopened.execute_scalar("SELECT COUNT(*) FROM users", &Params::new())?;
    assert_eq!(total, 2);

    Ok(())
}

#[tokio::test]
async fn test_dynamic_rows() {
    test_dynamic_rows_impl().unwrap();
}

fn test_dynamic_rows_impl() -> Result<()> {
    let access = create_test_db()?;
    seed_users(&access)?;

    let rows = access.execute_dynamics(
        "SELECT id, name, age FROM users ORDER BY id",
        &Params::new(),
        Some("name"),
    )?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].columns().collect::<Vec<_>>(), ["id", "age"]);
    assert_eq!(rows[1].get("age"), Some(&Value::Null));
    assert_eq!(rows[0].get_as::<i32>("age")?, 30);

    let first = access.execute_dynamic(
        "SELECT name FROM users WHERE email = :email",
        &Params::new().with_value("email", "jane@example.com"),
        None,
    )?;
    assert_eq!(
        first.and_then(|row| row.get("name").cloned()),
        Some(Value::from("Jane Roe"))
    );

    let none = access.execute_dynamic("SELECT * FROM users WHERE id = 99", &Params::new(), None)?;
    assert!(none.is_none());

    Ok(())
}

#[tokio::test]
async fn test_reader_and_sql_errors() {
    test_reader_and_sql_errors_impl().unwrap();
}

fn test_reader_and_sql_errors_impl() -> Result<()> {
    use rust_simple_access::Cursor;

    let access = create_test_db()?;
    seed_users(&access)?;

    let names = access.execute_reader(
        "SELECT name FROM users ORDER BY name",
        &Params::new(),
        |cursor| {
            assert_eq!(cursor.columns(), ["name"]);
            let mut names = Vec::new();
            while cursor.read()? {
                names.push(cursor.value(0).decode::<String>()?);
            }
            cursor.close();
            assert!(matches!(cursor.read(), Err(Error::CursorClosed)));
            Ok(names)
        },
    )?;
    assert_eq!(names, ["Jane Roe", "John Doe"]);

    let err = access
        .execute_non_query("INSERT INTO missing VALUES (1)", &Params::new())
        .unwrap_err();
    assert!(matches!(err, Error::Sqlite(_)));

    Ok(())
}

#[tokio::test]
async fn test_parameter_object_with_unused_fields() {
    test_parameter_object_with_unused_fields_impl().unwrap();
}

fn test_parameter_object_with_unused_fields_impl() -> Result<()> {
    let access = create_test_db()?;
    let user = NewUser {
        name: "Partial",
        email: "partial@example.com",
        age: Some(41),
        status: Some("Active"),
    };

    let params = Params::from_serialize(&user)?;
    access.execute_non_query(
        "INSERT INTO users (name, email) VALUES (:name, :email)",
        &params,
    )?;
    let stored: Option<User> = access.execute_entity(
        "SELECT * FROM users WHERE email = :email",
        &params,
        None,
    )?;

    let stored = stored.expect("inserted user exists");
    assert_eq!(stored.name, "Partial");
    assert_eq!(stored.age, None);
    assert_eq!(stored.status, None);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_cache_across_connections() {
    let cache = Arc::new(MetadataCache::new());

    let tasks = (0..4).map(|_| {
        let cache = Arc::clone(&cache);
        tokio::task::spawn_blocking(move || -> Result<usize> {
            let access = create_test_db()?.with_cache(cache.clone());
            assert!(Arc::ptr_eq(&access.shared_cache(), &cache));
            seed_users(&access)?;
            let users: Vec<User> =
                access.execute_entities("SELECT * FROM users", &Params::new(), None)?;
            Ok(users.len())
        })
    });

    for joined in futures::future::join_all(tasks).await {
        assert_eq!(joined.unwrap().unwrap(), 2);
    }
    assert_eq!(cache.len(), 1);
    assert!(Arc::ptr_eq(
        &cache.property_table::<User>(),
        &cache.property_table::<User>()
    ));
}
