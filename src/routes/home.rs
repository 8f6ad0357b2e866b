use axum::Json;

use super::Message;

pub async fn home() -> Json<Message> {
    Json(Message::new("Hello world!"))
}
