//! One-shot messages kept in the session until the next rendered page.

use actix_session::Session;

use crate::core::errors::AppResult;

const FLASH_KEY: &str = "_flashes";

pub fn push(session: &Session, message: &str) -> AppResult<()> {
    let mut messages: Vec<String> = session.get(FLASH_KEY)?.unwrap_or_default();
    messages.push(message.to_string());
    session.insert(FLASH_KEY, messages)?;
    Ok(())
}

pub fn take(session: &Session) -> AppResult<Vec<String>> {
    let messages: Vec<String> = session.get(FLASH_KEY)?.unwrap_or_default();
    if !messages.is_empty() {
        session.remove(FLASH_KEY);
    }
    Ok(messages)
}
