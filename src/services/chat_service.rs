use sqlx::PgPool;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::llm::{ChatMessage, ChatRequest, MessageRole};
use crate::models::{AccessDecision, CoachKind, Conversation, StoredChatMessage};
use crate::services::coach_prompts::full_system_prompt;
use crate::services::{ProfileService, SubscriptionService};

pub const MAX_MESSAGE_CHARS: usize = 4000;
pub const HISTORY_LIMIT: i64 = 20;
pub const MAX_TITLE_CHARS: usize = 60;

/// Trimmed message content, rejected when empty or too long
pub fn validate_content(raw: &str) -> Result<String, ApiError> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(ApiError::invalid("le message est vide"));
    }
    if content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::invalid(format!(
            "le message dépasse {} caractères",
            MAX_MESSAGE_CHARS
        )));
    }
    Ok(content.to_string())
}

/// Conversation title derived from its first message
pub fn conversation_title(first_message: &str) -> String {
    let single_line = first_message.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() <= MAX_TITLE_CHARS {
        return single_line;
    }
    let cut: String = single_line.chars().take(MAX_TITLE_CHARS - 1).collect();
    format!("{}…", cut.trim_end())
}

/// Everything needed to stream a reply and record it afterwards
#[derive(Debug, Clone)]
pub struct PreparedReply {
    pub conversation: Conversation,
    pub request: ChatRequest,
    pub access: AccessDecision,
}

#[derive(Clone)]
pub struct ChatService {
    db: PgPool,
    free_uses_allowed: i32,
}

impl ChatService {
    pub fn new(db: PgPool, free_uses_allowed: i32) -> Self {
        Self { db, free_uses_allowed }
    }

    pub async fn create_conversation(&self, user_id: Uuid, coach: CoachKind) -> Result<Conversation, ApiError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "INSERT INTO conversations (user_id, coach) VALUES ($1, $2) RETURNING *",
        )
        .bind(user_id)
        .bind(coach.as_str())
        .fetch_one(&self.db)
        .await?;

        Ok(conversation)
    }

    pub async fn list_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>, ApiError> {
        let conversations = sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE user_id = $1 ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(conversations)
    }

    pub async fn get_conversation(&self, user_id: Uuid, conversation_id: Uuid) -> Result<Conversation, ApiError> {
        sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE id = $1 AND user_id = $2")
            .bind(conversation_id)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(ApiError::NotFound("Conversation"))
    }

    pub async fn list_messages(&self, user_id: Uuid, conversation_id: Uuid) -> Result<Vec<StoredChatMessage>, ApiError> {
        self.get_conversation(user_id, conversation_id).await?;

        let messages = sqlx::query_as::<_, StoredChatMessage>(
            "SELECT * FROM chat_messages WHERE conversation_id = $1 ORDER BY created_at ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.db)
        .await?;

        Ok(messages)
    }

    pub async fn delete_conversation(&self, user_id: Uuid, conversation_id: Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1 AND user_id = $2")
            .bind(conversation_id)
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("Conversation"));
        }
        Ok(())
    }

    async fn recent_history(&self, conversation_id: Uuid) -> Result<Vec<ChatMessage>, ApiError> {
        let mut rows = sqlx::query_as::<_, StoredChatMessage>(
            "SELECT * FROM chat_messages WHERE conversation_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(conversation_id)
        .bind(HISTORY_LIMIT)
        .fetch_all(&self.db)
        .await?;
        rows.reverse();

        Ok(rows
            .into_iter()
            .filter_map(|row| match MessageRole::from_str(&row.role) {
                Some(MessageRole::User) => Some(ChatMessage::user(row.content)),
                Some(MessageRole::Assistant) => Some(ChatMessage::assistant(row.content)),
                _ => None,
            })
            .collect())
    }

    async fn store_message(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> Result<StoredChatMessage, ApiError> {
        let message = sqlx::query_as::<_, StoredChatMessage>(
            r#"
            INSERT INTO chat_messages (conversation_id, user_id, role, content)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(content)
        .fetch_one(&self.db)
        .await?;

        sqlx::query("UPDATE conversations SET updated_at = NOW() WHERE id = $1")
            .bind(conversation_id)
            .execute(&self.db)
            .await?;

        Ok(message)
    }

    /// Validate, check access, store the user message and build the LLM request
    #[instrument(skip(self, raw_content))]
    pub async fn prepare_reply(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        raw_content: &str,
    ) -> Result<PreparedReply, ApiError> {
        let content = validate_content(raw_content)?;
        let mut conversation = self.get_conversation(user_id, conversation_id).await?;

        let access = SubscriptionService::new(self.db.clone(), self.free_uses_allowed)
            .check_access(user_id)
            .await?;
        if access == AccessDecision::Denied {
            return Err(ApiError::SubscriptionRequired);
        }

        let coach = CoachKind::from_str(&conversation.coach).unwrap_or(CoachKind::Training);
        let context = ProfileService::new(self.db.clone())
            .load_coaching_context(user_id)
            .await?;
        let history = self.recent_history(conversation_id).await?;

        self.store_message(conversation_id, user_id, MessageRole::User, &content)
            .await?;

        if conversation.title.is_none() {
            let title = conversation_title(&content);
            sqlx::query("UPDATE conversations SET title = $2 WHERE id = $1 AND title IS NULL")
                .bind(conversation_id)
                .bind(&title)
                .execute(&self.db)
                .await?;
            conversation.title = Some(title);
        }

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(full_system_prompt(coach, &context)));
        messages.extend(history);
        messages.push(ChatMessage::user(content));

        Ok(PreparedReply {
            conversation,
            request: ChatRequest::new(messages).with_temperature(0.7),
            access,
        })
    }

    /// Persist the streamed answer and count the use
    pub async fn finish_reply(
        &self,
        user_id: Uuid,
        prepared: &PreparedReply,
        reply: &str,
    ) -> Result<StoredChatMessage, ApiError> {
        let message = self
            .store_message(prepared.conversation.id, user_id, MessageRole::Assistant, reply)
            .await?;

        let counted = SubscriptionService::new(self.db.clone(), self.free_uses_allowed)
            .record_use(user_id, prepared.access)
            .await?;
        if !counted {
            warn!(%user_id, "Reply delivered after the free allowance was spent concurrently");
        }

        info!(
            "Coach {} replied in conversation {}",
            prepared.conversation.coach, prepared.conversation.id
        );
        Ok(message)
    }
}
