mod impls;

pub use impls::{
    InMemoryEventRepository, InMemoryUserRepository, SurrealEventRepository, SurrealUserRepository,
};
