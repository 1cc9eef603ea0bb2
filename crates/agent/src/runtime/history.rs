//! The canonical conversation history shared by foreground and autoplay
//! turns.

use parking_lot::Mutex;

use ra_domain::tool::{Message, Role};

/// Internally synchronized message list. The lock is held only for the
/// copy or the push, never across an await.
#[derive(Debug, Default)]
pub struct ConversationHistory {
    messages: Mutex<Vec<Message>>,
}

impl ConversationHistory {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages: Mutex::new(messages),
        }
    }

    /// Independent copy for one turn's working history.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    pub fn append(&self, message: Message) {
        self.messages.lock().push(message);
    }

    /// Make `message` the leading system message. A different leading
    /// system message is replaced, otherwise it is inserted at the front.
    /// Returns `true` if the history changed.
    pub fn set_system_prompt(&self, message: Message) -> bool {
        let mut messages = self.messages.lock();
        match messages.first_mut() {
            Some(first) if first.role == Role::System => {
                if first.content == message.content {
                    return false;
                }
                *first = message;
            }
            _ => messages.insert(0, message),
        }
        true
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_detached() {
        let history = ConversationHistory::new(vec![Message::user("hi")]);
        let mut snap = history.snapshot();
        snap.push(Message::assistant("hello"));

        assert_eq!(history.len(), 1);
        history.append(Message::assistant("later"));
        assert_eq!(snap.len(), 2);
        assert_eq!(history.snapshot()[1].content, "later");
    }

    #[test]
    fn system_prompt_is_inserted_once() {
        let history = ConversationHistory::new(vec![Message::user("hi")]);
        assert!(history.set_system_prompt(Message::system("be terse")));
        assert!(!history.set_system_prompt(Message::system("be terse")));

        let snap = history.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].content, "be terse");
    }

    #[test]
    fn changed_system_prompt_replaces_the_old_one() {
        let history = ConversationHistory::new(vec![Message::system("old"), Message::user("hi")]);
        assert!(history.set_system_prompt(Message::system("new")));

        let snap = history.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].role, Role::System);
        assert_eq!(snap[0].content, "new");
        assert_eq!(snap[1].content, "hi");
    }

    #[test]
    fn empty_by_default() {
        assert!(ConversationHistory::default().is_empty());
    }
}
