use std::convert::Infallible;
use log::{debug, error};
use serde::Serialize;
use uuid::Uuid;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};
use todolist_lib::{DbError, ItemEvent, ListEvent, Registry, TodoItem, TodoList};
use crate::{AppState, with_state};

const NEW_ITEM_TEXT: &str = "My new item";

/// List and item management under `/list`.
pub fn routes(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let new_list = warp::post()
        .and(warp::path!("list"))
        .and(warp::body::json::<TodoList>())
        .and(with_state(state.clone()))
        .and_then(handle_new_list);

    let delete_list = warp::delete()
        .and(warp::path!("list" / String))
        .and(with_state(state.clone()))
        .and_then(handle_delete_list);

    let add_item = warp::put()
        .and(warp::path!("list" / String / "add"))
        .and(with_state(state.clone()))
        .and_then(handle_add_item);

    let update_item = warp::put()
        .and(warp::path!("list" / String / "item" / String))
        .and(warp::body::json::<TodoItem>())
        .and(with_state(state.clone()))
        .and_then(handle_update_item);

    let delete_item = warp::delete()
        .and(warp::path!("list" / String / "item" / String))
        .and(with_state(state))
        .and_then(handle_delete_item);

    new_list
        .or(delete_list)
        .or(add_item)
        .or(update_item)
        .or(delete_item)
}

/// Serialize an event and push it to every subscriber.
async fn publish<T: Serialize>(registry: &Registry, event: &T) {
    match serde_json::to_vec(event) {
        Ok(data) => registry.broadcast(data).await,
        Err(e) => error!("unable to broadcast event: {}", e),
    }
}

fn parse_id(raw: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(raw).map_err(|e| {
        debug!("bad id '{}': {}", raw, e);
        StatusCode::BAD_REQUEST.into_response()
    })
}

fn store_failure(action: &str, e: DbError) -> Response {
    match e {
        DbError::NotFound(what) => {
            debug!("failed to {}: {} not found", action, what);
            StatusCode::NOT_FOUND.into_response()
        }
        e => {
            error!("failed to {}: {}", action, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn handle_new_list(mut list: TodoList, state: AppState) -> Result<Response, Infallible> {
    if let Err(reason) = list.validate() {
        debug!("rejecting new list: {}", reason);
        return Ok(StatusCode::BAD_REQUEST.into_response());
    }
    list.assign_ids();

    if let Err(e) = state.store.add_todo_list(&list).await {
        return Ok(store_failure("add list", e));
    }
    publish(&state.registry, &ListEvent::updated(list.clone())).await;
    Ok(warp::reply::json(&list).into_response())
}

async fn handle_delete_list(list_id: String, state: AppState) -> Result<Response, Infallible> {
    let id = match parse_id(&list_id) {
        Ok(id) => id,
        Err(res) => return Ok(res),
    };

    if let Err(e) = state.store.remove_todo_list(id).await {
        return Ok(store_failure("remove list", e));
    }
    publish(&state.registry, &ListEvent::removed(id)).await;
    Ok(StatusCode::OK.into_response())
}

async fn handle_add_item(list_id: String, state: AppState) -> Result<Response, Infallible> {
    let list = match parse_id(&list_id) {
        Ok(id) => id,
        Err(res) => return Ok(res),
    };

    let item = TodoItem {
        id: Uuid::new_v4(),
        list,
        text: NEW_ITEM_TEXT.to_string(),
        marked: false,
    };
    if let Err(e) = state.store.add_todo_item(list, &item).await {
        return Ok(store_failure("add item", e));
    }
    publish(&state.registry, &ItemEvent::added(item.clone())).await;
    Ok(warp::reply::json(&item).into_response())
}

async fn handle_update_item(
    list_id: String,
    item_id: String,
    mut item: TodoItem,
    state: AppState,
) -> Result<Response, Infallible> {
    let (list, id) = match (parse_id(&list_id), parse_id(&item_id)) {
        (Ok(list), Ok(id)) => (list, id),
        (Err(res), _) | (_, Err(res)) => return Ok(res),
    };

    // the path names the item, whatever the body says
    item.id = id;
    item.list = list;
    if let Err(e) = state.store.update_todo_item(&item).await {
        return Ok(store_failure("update item", e));
    }
    publish(&state.registry, &ItemEvent::updated(item)).await;
    Ok(StatusCode::OK.into_response())
}

async fn handle_delete_item(
    list_id: String,
    item_id: String,
    state: AppState,
) -> Result<Response, Infallible> {
    let (list, id) = match (parse_id(&list_id), parse_id(&item_id)) {
        (Ok(list), Ok(id)) => (list, id),
        (Err(res), _) | (_, Err(res)) => return Ok(res),
    };

    if let Err(e) = state.store.delete_todo_item(list, id).await {
        return Ok(store_failure("delete item", e));
    }
    publish(&state.registry, &ItemEvent::removed(list, id)).await;
    Ok(StatusCode::OK.into_response())
}
