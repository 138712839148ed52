use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A todo list with its items.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoList {
    #[serde(default, skip_serializing_if = "Uuid::is_nil")]
    pub id:    Uuid,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub owner: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name:  String,
    #[serde(default)]
    pub items: Vec<TodoItem>,
}

/// One entry of a list. `list` is the owning list's id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    #[serde(default, skip_serializing_if = "Uuid::is_nil")]
    pub id:     Uuid,
    #[serde(default, skip_serializing_if = "Uuid::is_nil")]
    pub list:   Uuid,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text:   String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub marked: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListEventType {
    UpdateList,
    RemoveList,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemEventType {
    AddItem,
    UpdateItem,
    RemoveItem,
}

/// Change to a whole list, pushed to every subscriber.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListEvent {
    #[serde(rename = "type")]
    pub kind: ListEventType,
    #[serde(rename = "todolist", skip_serializing_if = "Option::is_none")]
    pub todo_list: Option<TodoList>,
}

/// Change to a single item, pushed to every subscriber.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemEvent {
    #[serde(rename = "type")]
    pub kind: ItemEventType,
    #[serde(rename = "todoitem", skip_serializing_if = "Option::is_none")]
    pub todo_item: Option<TodoItem>,
}

impl ListEvent {
    pub fn updated(list: TodoList) -> Self {
        Self { kind: ListEventType::UpdateList, todo_list: Some(list) }
    }

    /// Removal only carries the list id.
    pub fn removed(id: Uuid) -> Self {
        let list = TodoList { id, ..Default::default() };
        Self { kind: ListEventType::RemoveList, todo_list: Some(list) }
    }
}

impl ItemEvent {
    pub fn added(item: TodoItem) -> Self {
        Self { kind: ItemEventType::AddItem, todo_item: Some(item) }
    }

    pub fn updated(item: TodoItem) -> Self {
        Self { kind: ItemEventType::UpdateItem, todo_item: Some(item) }
    }

    pub fn removed(list: Uuid, id: Uuid) -> Self {
        let item = TodoItem { id, list, ..Default::default() };
        Self { kind: ItemEventType::RemoveItem, todo_item: Some(item) }
    }
}

impl TodoList {
    /// A new list needs a name and an owner.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.name.is_empty() {
            return Err("list name is required");
        }
        if self.owner.is_empty() {
            return Err("list owner is required");
        }
        Ok(())
    }

    /// Give the list and all of its items fresh ids.
    pub fn assign_ids(&mut self) {
        self.id = Uuid::new_v4();
        for item in &mut self.items {
            item.id = Uuid::new_v4();
            item.list = self.id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_list_event_shape() {
        let id = Uuid::new_v4();
        let item = Uuid::new_v4();
        let list = TodoList {
            id,
            owner: "Jonas".into(),
            name:  "Shopping".into(),
            items: vec![TodoItem { id: item, list: id, text: "Salad".into(), marked: false }],
        };

        let value = serde_json::to_value(ListEvent::updated(list)).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "update-list",
                "todolist": {
                    "id": id,
                    "owner": "Jonas",
                    "name": "Shopping",
                    "items": [{ "id": item, "list": id, "text": "Salad" }]
                }
            })
        );
    }

    #[test]
    fn remove_events_carry_only_ids() {
        let list = Uuid::new_v4();
        let item = Uuid::new_v4();

        let value = serde_json::to_value(ListEvent::removed(list)).unwrap();
        assert_eq!(value, json!({ "type": "remove-list", "todolist": { "id": list, "items": [] } }));

        let value = serde_json::to_value(ItemEvent::removed(list, item)).unwrap();
        assert_eq!(value, json!({ "type": "remove-item", "todoitem": { "id": item, "list": list } }));
    }

    #[test]
    fn list_from_client_without_ids() {
        let mut list: TodoList = serde_json::from_value(json!({
            "name": "Chores",
            "owner": "Kim",
            "items": [{ "text": "Dishes" }, { "text": "Laundry", "marked": true }]
        }))
        .unwrap();
        assert!(list.id.is_nil());
        assert!(list.validate().is_ok());

        list.assign_ids();
        assert!(!list.id.is_nil());
        assert!(list.items.iter().all(|i| !i.id.is_nil() && i.list == list.id));
        assert!(list.items[1].marked);
    }

    #[test]
    fn validation_requires_name_and_owner() {
        let list = TodoList { owner: "Kim".into(), ..Default::default() };
        assert_eq!(list.validate(), Err("list name is required"));

        let list = TodoList { name: "Chores".into(), ..Default::default() };
        assert_eq!(list.validate(), Err("list owner is required"));
    }
}
