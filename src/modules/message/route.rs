use actix_web::web::{ServiceConfig, scope};

use crate::modules::message::handle::*;

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(
        scope("/messages")
            .service(send_direct_message)
            .service(send_broadcast)
            .service(get_conversation)
            .service(get_message_history)
            .service(get_broadcasts)
            .service(mark_as_delivered)
            .service(mark_as_read)
            .service(delete_message),
    );
}
