// src/main.rs

mod api;
mod config;
mod events;
use config::Config;
use dotenv::dotenv;
use std::convert::Infallible;
use std::error::Error;
use log::{info, error};
use warp::Filter;
use todolist_lib::{Registry, TodoItem, TodoList, TodoStore};

/* RUST_LOG=todolist_lib=debug,todolist_server=info \
cargo run -p todolist-server */

/// Everything a request handler needs, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store:    TodoStore,
    pub registry: Registry,
}

/// Cloneable filter handing the state to handlers
pub fn with_state(
    state: AppState,
) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// All routes, with CORS and request logging.
pub fn routes(
    state: AppState,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let health = warp::path!("health").map(|| "OK");

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allow_headers(vec!["content-type", "accept", "last-event-id", "origin"])
        .expose_header("link")
        .max_age(300);

    events::routes(state.clone())
        .or(api::routes(state))
        .or(health)
        .with(cors)
        .with(warp::log("todolist_server::http"))
}

/// Give a fresh database something to show.
async fn seed_sample_data(store: &TodoStore) -> Result<(), Box<dyn Error>> {
    if !store.todo_lists().await?.is_empty() {
        return Ok(());
    }

    let mut sample = TodoList {
        owner: "Jonas".into(),
        name:  "Shopping list, Sunday".into(),
        items: vec![
            TodoItem { text: "Salad".into(), marked: false, ..Default::default() },
            TodoItem { text: "Potatoes".into(), marked: true, ..Default::default() },
        ],
        ..Default::default()
    };
    sample.assign_ids();
    store.add_todo_list(&sample).await?;
    info!("Seeded sample list {}", sample.id);
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    // a missing .env just means everything comes from the environment
    dotenv().ok();

    // initialize logger and panic hook
    env_logger::init();
    std::panic::set_hook(Box::new(|info| {
        error!("Thread panic: {:?}", info);
    }));

    let config = Config::from_env()?;
    info!("Configured database: {}", config.db_path.display());

    let store = TodoStore::open(&config.db_path).await?;
    seed_sample_data(&store).await?;
    for list in store.todo_lists().await? {
        info!("todo list {}: {} ({} items)", list.id, list.name, list.items.len());
    }

    let registry = Registry::new(config.send_timeout);
    let state = AppState { store: store.clone(), registry: registry.clone() };

    let (addr, server) = warp::serve(routes(state)).try_bind_with_graceful_shutdown(
        config.addr,
        async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down, closing event streams");
            registry.shutdown();
        },
    )?;

    info!("HTTP  : {} (lists + items)", addr);
    info!("SSE   : {}/events", addr);
    match config.send_timeout {
        Some(limit) => info!("Stalled clients are dropped after {:?}", limit),
        None => info!("Send timeout disabled"),
    }

    server.await;
    store.close().await;
    Ok(())
}
