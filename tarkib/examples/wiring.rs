//! Basic example of wiring an object graph through bean definitions.

use std::sync::Arc;

use parking_lot::RwLock;
use tarkib::prelude::*;

// === Define your traits and types ===

trait Logger: Send + Sync {
    fn log(&self, msg: &str);
}

struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, msg: &str) {
        println!("[LOG] {msg}");
    }
}

struct Database {
    url: String,
    logger: Arc<dyn Logger>,
}

impl Database {
    fn query(&self, sql: &str) -> String {
        self.logger.log(&format!("Executing: {sql}"));
        format!("Results from {}", self.url)
    }
}

struct UserRepository {
    // Settable properties use interior mutability; the container writes
    // them through `&self` setters during population.
    db: RwLock<Option<Arc<Database>>>,
}

impl UserRepository {
    fn find_user(&self, id: u64) -> String {
        let db = self.db.read().clone().expect("db wired");
        db.query(&format!("SELECT * FROM users WHERE id = {id}"))
    }
}

fn main() -> Result<()> {
    // Initialize tracing (logging)
    tracing_subscriber::fmt()
        .with_env_filter("tarkib=debug")
        .init();

    let factory = BeanFactory::new();

    // === Describe the types ===

    factory.register_descriptor(
        TypeDescriptor::new::<ConsoleLogger>()
            .with_constructor(ConstructorDescriptor::new(vec![], |_| Ok(handle(ConsoleLogger))))
            .with_cast::<dyn Logger>(|h| {
                let logger = typed::<ConsoleLogger>(h)?;
                Some(handle(logger as Arc<dyn Logger>))
            }),
    )?;

    factory.register_descriptor(TypeDescriptor::new::<Database>().with_constructor(
        ConstructorDescriptor::new(
            vec![
                ParamSpec::new("url", TypeSpec::str()),
                ParamSpec::new("logger", TypeSpec::component::<dyn Logger>()),
            ],
            |args| {
                let url = args[0].as_str().unwrap_or_default().to_owned();
                let logger = args[1]
                    .instance_as::<Arc<dyn Logger>>()
                    .map(|a| (*a).clone())
                    .expect("logger argument");
                Ok(handle(Database { url, logger }))
            },
        ),
    ))?;

    factory.register_descriptor(
        TypeDescriptor::new::<UserRepository>()
            .with_constructor(ConstructorDescriptor::new(vec![], |_| {
                Ok(handle(UserRepository { db: RwLock::new(None) }))
            }))
            .with_property(PropertyDescriptor::new(
                "db",
                TypeSpec::component::<Database>(),
                |bean, value| {
                    let repo = typed::<UserRepository>(bean).expect("repository bean");
                    *repo.db.write() = value.instance_as::<Database>();
                    Ok(())
                },
            )),
    )?;

    // === Register the definitions ===

    factory.register_definition("logger", BeanDefinition::of::<ConsoleLogger>())?;
    factory.register_definition(
        "database",
        BeanDefinition::of::<Database>()
            .arg("postgres://localhost/myapp")
            .arg_ref("logger")
            .with_autowire(AutowireMode::Constructor),
    )?;
    factory.register_definition(
        "userRepository",
        BeanDefinition::of::<UserRepository>().property_ref("db", "database"),
    )?;

    println!("container ready: {factory:?}");

    // === Resolve and use ===

    let repo: Arc<UserRepository> = factory.get_bean("userRepository")?;
    println!("{}", repo.find_user(42));

    // Singletons keep their identity.
    let again: Arc<UserRepository> = factory.get_bean("userRepository")?;
    assert!(Arc::ptr_eq(&repo, &again));

    factory.destroy_singletons();
    Ok(())
}
