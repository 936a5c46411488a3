//! Typed façade over the server resources.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde_json::json;

use crate::error::ApiError;
use crate::session::Identity;
use crate::transport::{ApiRequest, MultipartField, TransportPipeline};

use super::envelope::{decode_entity, decode_page};
use super::types::{
    BroadcastAudience, BroadcastJob, BroadcastRequest, FailedRecipient, KnowledgeBaseEntry,
    KnowledgeBaseUpdate, ListParams, NewKnowledgeBaseEntry, NewUser, Page, Ticket, TicketUpdate,
    UserUpdate, WhatsappUser, WhitelistNumber,
};

/// E.164-ish: optional +, no leading zero, 7 to 15 digits.
static PHONE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[1-9][0-9]{6,14}$").expect("invalid phone number pattern"));

/// One client per resource family; every method returns either a typed
/// entity or a canonical `Page<T>`.
pub struct ResourceClient {
    pipeline: Arc<TransportPipeline>,
}

impl ResourceClient {
    pub fn new(pipeline: Arc<TransportPipeline>) -> Self {
        Self { pipeline }
    }

    // ========================================================================
    // Tickets
    // ========================================================================

    pub async fn list_tickets(&self, params: &ListParams) -> Result<Page<Ticket>, ApiError> {
        let body = self
            .pipeline
            .send(ApiRequest::get("/tickets").with_query_pairs(params.to_query()))
            .await?;
        decode_page(body, "tickets", params)
    }

    pub async fn get_ticket(&self, id: i64) -> Result<Ticket, ApiError> {
        let body = self
            .pipeline
            .send(ApiRequest::get(format!("/tickets/{}", id)))
            .await?;
        decode_entity(body, Some("ticket"))
    }

    /// Issue a partial ticket update. Workflow rules live in the workflow
    /// engine; this is the raw resource call.
    pub async fn update_ticket(&self, id: i64, update: &TicketUpdate) -> Result<Ticket, ApiError> {
        let payload = serde_json::to_value(update)
            .map_err(|e| ApiError::validation(format!("unserializable update: {}", e)))?;
        let body = self
            .pipeline
            .send(ApiRequest::patch(format!("/tickets/{}", id)).with_json(payload))
            .await?;
        decode_entity(body, Some("ticket"))
    }

    // ========================================================================
    // Console users
    // ========================================================================

    pub async fn list_users(&self, params: &ListParams) -> Result<Page<Identity>, ApiError> {
        let body = self
            .pipeline
            .send(ApiRequest::get("/users").with_query_pairs(params.to_query()))
            .await?;
        decode_page(body, "users", params)
    }

    pub async fn get_user(&self, id: i64) -> Result<Identity, ApiError> {
        let body = self
            .pipeline
            .send(ApiRequest::get(format!("/users/{}", id)))
            .await?;
        decode_entity(body, Some("user"))
    }

    pub async fn create_user(&self, user: &NewUser) -> Result<Identity, ApiError> {
        let payload = serde_json::to_value(user)
            .map_err(|e| ApiError::validation(format!("unserializable user: {}", e)))?;
        let body = self
            .pipeline
            .send(ApiRequest::post("/users").with_json(payload))
            .await?;
        decode_entity(body, Some("user"))
    }

    pub async fn update_user(&self, id: i64, update: &UserUpdate) -> Result<Identity, ApiError> {
        let payload = serde_json::to_value(update)
            .map_err(|e| ApiError::validation(format!("unserializable update: {}", e)))?;
        let body = self
            .pipeline
            .send(ApiRequest::patch(format!("/users/{}", id)).with_json(payload))
            .await?;
        decode_entity(body, Some("user"))
    }

    pub async fn delete_user(&self, id: i64) -> Result<(), ApiError> {
        self.pipeline
            .send(ApiRequest::delete(format!("/users/{}", id)))
            .await?;
        Ok(())
    }

    // ========================================================================
    // Whatsapp users (the bot's customers)
    // ========================================================================

    pub async fn list_whatsapp_users(
        &self,
        params: &ListParams,
    ) -> Result<Page<WhatsappUser>, ApiError> {
        let body = self
            .pipeline
            .send(ApiRequest::get("/whatsapp-users").with_query_pairs(params.to_query()))
            .await?;
        decode_page(body, "whatsapp_users", params)
    }

    pub async fn get_whatsapp_user(&self, id: i64) -> Result<WhatsappUser, ApiError> {
        let body = self
            .pipeline
            .send(ApiRequest::get(format!("/whatsapp-users/{}", id)))
            .await?;
        decode_entity(body, Some("whatsapp_user"))
    }

    pub async fn set_whatsapp_user_blocked(
        &self,
        id: i64,
        blocked: bool,
    ) -> Result<WhatsappUser, ApiError> {
        let body = self
            .pipeline
            .send(
                ApiRequest::patch(format!("/whatsapp-users/{}", id))
                    .with_json(json!({"is_blocked": blocked})),
            )
            .await?;
        decode_entity(body, Some("whatsapp_user"))
    }

    // ========================================================================
    // Knowledge base
    // ========================================================================

    pub async fn list_knowledge_base(
        &self,
        params: &ListParams,
    ) -> Result<Page<KnowledgeBaseEntry>, ApiError> {
        let body = self
            .pipeline
            .send(ApiRequest::get("/knowledge-base").with_query_pairs(params.to_query()))
            .await?;
        decode_page(body, "entries", params)
    }

    pub async fn get_knowledge_base_entry(&self, id: i64) -> Result<KnowledgeBaseEntry, ApiError> {
        let body = self
            .pipeline
            .send(ApiRequest::get(format!("/knowledge-base/{}", id)))
            .await?;
        decode_entity(body, Some("entry"))
    }

    pub async fn create_knowledge_base_entry(
        &self,
        entry: &NewKnowledgeBaseEntry,
    ) -> Result<KnowledgeBaseEntry, ApiError> {
        let payload = serde_json::to_value(entry)
            .map_err(|e| ApiError::validation(format!("unserializable entry: {}", e)))?;
        let body = self
            .pipeline
            .send(ApiRequest::post("/knowledge-base").with_json(payload))
            .await?;
        decode_entity(body, Some("entry"))
    }

    pub async fn update_knowledge_base_entry(
        &self,
        id: i64,
        update: &KnowledgeBaseUpdate,
    ) -> Result<KnowledgeBaseEntry, ApiError> {
        let payload = serde_json::to_value(update)
            .map_err(|e| ApiError::validation(format!("unserializable update: {}", e)))?;
        let body = self
            .pipeline
            .send(ApiRequest::patch(format!("/knowledge-base/{}", id)).with_json(payload))
            .await?;
        decode_entity(body, Some("entry"))
    }

    pub async fn delete_knowledge_base_entry(&self, id: i64) -> Result<(), ApiError> {
        self.pipeline
            .send(ApiRequest::delete(format!("/knowledge-base/{}", id)))
            .await?;
        Ok(())
    }

    // ========================================================================
    // Broadcasts
    // ========================================================================

    pub async fn create_broadcast(
        &self,
        request: &BroadcastRequest,
    ) -> Result<BroadcastJob, ApiError> {
        let api_request = match &request.audience {
            BroadcastAudience::Recipients(recipients) => {
                if recipients.is_empty() {
                    return Err(ApiError::validation("broadcast has no recipients"));
                }
                ApiRequest::post("/broadcasts").with_json(json!({
                    "message": request.message,
                    "recipients": recipients,
                }))
            }
            BroadcastAudience::File { filename, content } => ApiRequest::post("/broadcasts")
                .with_multipart(vec![
                    MultipartField::text("message", request.message.clone()),
                    MultipartField::file("file", filename.clone(), content.clone()),
                ]),
        };

        let body = self.pipeline.send(api_request).await?;
        decode_entity(body, Some("job"))
    }

    pub async fn list_broadcasts(
        &self,
        params: &ListParams,
    ) -> Result<Page<BroadcastJob>, ApiError> {
        let body = self
            .pipeline
            .send(ApiRequest::get("/broadcasts").with_query_pairs(params.to_query()))
            .await?;
        decode_page(body, "jobs", params)
    }

    pub async fn get_broadcast(&self, id: i64) -> Result<BroadcastJob, ApiError> {
        let body = self
            .pipeline
            .send(ApiRequest::get(format!("/broadcasts/{}", id)))
            .await?;
        decode_entity(body, Some("job"))
    }

    /// Recipients the job could not deliver to.
    pub async fn get_broadcast_failures(
        &self,
        id: i64,
        params: &ListParams,
    ) -> Result<Page<FailedRecipient>, ApiError> {
        let body = self
            .pipeline
            .send(
                ApiRequest::get(format!("/broadcasts/{}/failed", id))
                    .with_query_pairs(params.to_query()),
            )
            .await?;
        decode_page(body, "recipients", params)
    }

    /// Request cancellation. The job's status changes only when a later
    /// read observes the server-reported state.
    pub async fn cancel_broadcast(&self, id: i64) -> Result<(), ApiError> {
        self.pipeline
            .send(ApiRequest::post(format!("/broadcasts/{}/cancel", id)))
            .await?;
        Ok(())
    }

    // ========================================================================
    // Whitelist
    // ========================================================================

    pub async fn list_whitelist(
        &self,
        params: &ListParams,
    ) -> Result<Page<WhitelistNumber>, ApiError> {
        let body = self
            .pipeline
            .send(ApiRequest::get("/whitelist").with_query_pairs(params.to_query()))
            .await?;
        decode_page(body, "numbers", params)
    }

    /// Add a number to the whitelist. The number is validated client-side
    /// before any network call.
    pub async fn add_whitelist_number(
        &self,
        phone_number: &str,
        note: Option<&str>,
    ) -> Result<WhitelistNumber, ApiError> {
        validate_phone_number(phone_number)?;

        let mut payload = json!({"phone_number": phone_number});
        if let Some(note) = note {
            payload["note"] = json!(note);
        }
        let body = self
            .pipeline
            .send(ApiRequest::post("/whitelist").with_json(payload))
            .await?;
        decode_entity(body, Some("number"))
    }

    pub async fn remove_whitelist_number(&self, id: i64) -> Result<(), ApiError> {
        self.pipeline
            .send(ApiRequest::delete(format!("/whitelist/{}", id)))
            .await?;
        Ok(())
    }
}

fn validate_phone_number(phone_number: &str) -> Result<(), ApiError> {
    if PHONE_NUMBER.is_match(phone_number) {
        Ok(())
    } else {
        let mut fields = std::collections::BTreeMap::new();
        fields.insert(
            "phone_number".to_string(),
            "must be an international number, e.g. +393331234567".to_string(),
        );
        Err(ApiError::ValidationFailed {
            message: format!("invalid phone number: {}", phone_number),
            fields,
        })
    }
}
