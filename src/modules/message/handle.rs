use actix_web::{HttpRequest, delete, get, post, put, web};

use crate::{
    api::{error, success},
    middlewares::get_claims,
    modules::message::{
        model::{MessageQueryParams, SendBroadcastMessage, SendDirectMessage},
        repository_pg::MessageRepositoryPg,
        schema::MessageEntity,
        service::MessageService,
    },
    utils::{ValidatedJson, ValidatedQuery},
};

pub type MessageSvc = MessageService<MessageRepositoryPg>;

#[post("/")]
pub async fn send_direct_message(
    message_service: web::Data<MessageSvc>,
    ValidatedJson(body): ValidatedJson<SendDirectMessage>,
    req: HttpRequest,
) -> Result<success::Success<MessageEntity>, error::Error> {
    let user_id = get_claims(&req)?.sub;
    let message = message_service
        .send_direct_message(user_id, body.recipient_id, body.content, body.media_url)
        .await?;

    Ok(success::Success::created(Some(message)).message("Message sent successfully"))
}

#[post("/broadcast")]
pub async fn send_broadcast(
    message_service: web::Data<MessageSvc>,
    ValidatedJson(body): ValidatedJson<SendBroadcastMessage>,
    req: HttpRequest,
) -> Result<success::Success<MessageEntity>, error::Error> {
    let user_id = get_claims(&req)?.sub;
    let message = message_service
        .send_broadcast(user_id, body.content, body.media_url, body.recipient_ids)
        .await?;

    Ok(success::Success::created(Some(message)).message("Broadcast sent successfully"))
}

#[get("/conversation/{user_id}")]
pub async fn get_conversation(
    message_service: web::Data<MessageSvc>,
    other_user_id: web::Path<i64>,
    ValidatedQuery(params): ValidatedQuery<MessageQueryParams>,
    req: HttpRequest,
) -> Result<success::Success<Vec<MessageEntity>>, error::Error> {
    let user_id = get_claims(&req)?.sub;
    let messages = message_service
        .get_conversation(user_id, other_user_id.into_inner(), &params.into())
        .await?;

    Ok(success::Success::ok(Some(messages)))
}

#[get("/history")]
pub async fn get_message_history(
    message_service: web::Data<MessageSvc>,
    ValidatedQuery(params): ValidatedQuery<MessageQueryParams>,
    req: HttpRequest,
) -> Result<success::Success<Vec<MessageEntity>>, error::Error> {
    let user_id = get_claims(&req)?.sub;
    let messages = message_service.get_message_history(user_id, &params.into()).await?;

    Ok(success::Success::ok(Some(messages)))
}

#[get("/broadcasts")]
pub async fn get_broadcasts(
    message_service: web::Data<MessageSvc>,
    ValidatedQuery(params): ValidatedQuery<MessageQueryParams>,
    req: HttpRequest,
) -> Result<success::Success<Vec<MessageEntity>>, error::Error> {
    let user_id = get_claims(&req)?.sub;
    let messages = message_service.get_broadcasts(user_id, &params.into()).await?;

    Ok(success::Success::ok(Some(messages)))
}

#[put("/{id}/delivered")]
pub async fn mark_as_delivered(
    message_service: web::Data<MessageSvc>,
    message_id: web::Path<i64>,
) -> Result<success::Success<MessageEntity>, error::Error> {
    let message = message_service.mark_as_delivered(message_id.into_inner()).await?;

    Ok(success::Success::ok(Some(message)).message("Message marked as delivered"))
}

#[put("/{id}/read")]
pub async fn mark_as_read(
    message_service: web::Data<MessageSvc>,
    message_id: web::Path<i64>,
    req: HttpRequest,
) -> Result<success::Success<MessageEntity>, error::Error> {
    let user_id = get_claims(&req)?.sub;
    let message = message_service.mark_as_read(message_id.into_inner(), user_id).await?;

    Ok(success::Success::ok(Some(message)).message("Message marked as read"))
}

#[delete("/{id}")]
pub async fn delete_message(
    message_service: web::Data<MessageSvc>,
    message_id: web::Path<i64>,
    req: HttpRequest,
) -> Result<success::Success<()>, error::Error> {
    let user_id = get_claims(&req)?.sub;
    message_service.delete_message(message_id.into_inner(), user_id).await?;

    Ok(success::Success::no_content())
}
