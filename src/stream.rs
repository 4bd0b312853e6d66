//! Streamed conversation parser
//!
//! `POST /backend-api/conversation` answers with a line-oriented
//! `text/event-stream` body. Each `data: ` line carries a full
//! [`ConversationEvent`] snapshot; the backend streams token-level deltas as
//! repeated events for the same message id. The parser is fed raw body
//! chunks, reassembles lines itself, and emits actions for the driver:
//! deliver an assistant event, generate a title for the echoed user message,
//! or stop.
//!
//! Termination is either the explicit `data: [DONE]` sentinel, an assistant
//! event flagged `end_turn`, or plain end of stream. Once finished, any
//! input still buffered is never processed.

use crate::error::{Error, Result};
use crate::protocol::{ConversationEvent, Role};

const DATA_PREFIX: &str = "data: ";
const END_OF_STREAM: &str = "data: [DONE]";

/// What the driver should do with one parsed line.
#[derive(Debug)]
pub enum StreamAction {
    /// Forward an assistant event to the caller's consumer.
    Deliver(ConversationEvent),
    /// The user message was echoed back; kick off title generation.
    GenerateTitle {
        conversation_id: String,
        message_id: String,
    },
    /// The turn is over. No further actions will be produced.
    Terminate,
}

/// Incremental parser over the streamed response body.
///
/// The body arrives in chunks cut at arbitrary byte boundaries, which can
/// land in the middle of a multibyte character. Raw bytes are buffered and
/// only complete lines are decoded, so a split character is reassembled
/// before it is ever interpreted as text.
#[derive(Debug, Default)]
pub struct StreamParser {
    buffer: Vec<u8>,
    conversation_id: String,
    finished: bool,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one body chunk, returning the actions for every line completed
    /// by it. Decode failures on a `data: ` line are fatal.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<StreamAction>> {
        let mut actions = Vec::new();
        if self.finished {
            return Ok(actions);
        }
        self.buffer.extend_from_slice(chunk);

        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = std::str::from_utf8(&raw)?;
            self.process_line(line.trim_end_matches(['\r', '\n']), &mut actions)?;
            if self.finished {
                break;
            }
        }
        Ok(actions)
    }

    /// End of stream with no sentinel seen: a final partial line (no
    /// trailing newline) is still processed, then the parser yields the
    /// conversation id it tracked.
    pub fn finish(mut self) -> Result<(String, Vec<StreamAction>)> {
        let mut actions = Vec::new();
        if !self.finished && !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = std::str::from_utf8(&raw)?;
            if !line.trim().is_empty() {
                self.process_line(line.trim_end_matches(['\r', '\n']), &mut actions)?;
            }
        }
        Ok((self.conversation_id, actions))
    }

    /// Whether a terminating condition has been seen. Further chunks are
    /// ignored once this is true.
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// The conversation id tracked so far (first one seen wins).
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    fn process_line(&mut self, line: &str, actions: &mut Vec<StreamAction>) -> Result<()> {
        if line.trim().is_empty() {
            return Ok(());
        }
        if line.starts_with(END_OF_STREAM) {
            tracing::debug!("end-of-stream sentinel received");
            self.finished = true;
            actions.push(StreamAction::Terminate);
            return Ok(());
        }
        let Some(data) = line.strip_prefix(DATA_PREFIX) else {
            // Keepalives and unrecognized event lines pass through silently.
            tracing::debug!(line, "ignoring non-data stream line");
            return Ok(());
        };

        let event: ConversationEvent = serde_json::from_str(data.trim())
            .map_err(|err| Error::decode("streamed conversation event", err))?;

        if self.conversation_id.is_empty() {
            self.conversation_id = event.conversation_id.clone();
        } else if self.conversation_id != event.conversation_id {
            tracing::warn!(
                tracked = %self.conversation_id,
                received = %event.conversation_id,
                "conversation id changed mid-stream, keeping the first one"
            );
        }

        match event.message.author.role {
            Role::User => {
                // Echo of our own outbound message. Not delivered; it only
                // carries the ids the title generation call needs.
                actions.push(StreamAction::GenerateTitle {
                    conversation_id: event.conversation_id.clone(),
                    message_id: event.message.id.clone(),
                });
            }
            Role::Assistant => {
                let end_turn = event.message.end_turn == Some(true);
                actions.push(StreamAction::Deliver(event));
                if end_turn {
                    tracing::debug!("assistant signalled end of turn");
                    self.finished = true;
                    actions.push(StreamAction::Terminate);
                }
            }
            _ => {
                tracing::debug!(role = ?event.message.author.role, "skipping event");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{StreamAction, StreamParser};
    use crate::error::Error;

    fn data_line(conversation_id: &str, message_id: &str, role: &str, part: &str, end_turn: Option<bool>) -> String {
        let end_turn = match end_turn {
            Some(v) => format!(", \"end_turn\": {v}"),
            None => String::new(),
        };
        format!(
            "data: {{\"conversation_id\": \"{conversation_id}\", \"message\": {{\"id\": \"{message_id}\", \
             \"author\": {{\"role\": \"{role}\"}}, \"content\": {{\"content_type\": \"text\", \
             \"parts\": [\"{part}\"]}}{end_turn}}}}}\n"
        )
    }

    #[test]
    fn echo_is_turned_into_title_generation_not_delivered() {
        let mut parser = StreamParser::new();
        let actions = parser
            .feed(data_line("conv-1", "msg-user", "user", "hi", None).as_bytes())
            .unwrap();
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            &actions[0],
            StreamAction::GenerateTitle { conversation_id, message_id }
                if conversation_id == "conv-1" && message_id == "msg-user"
        ));
        assert!(!parser.finished());
    }

    #[test]
    fn end_turn_terminates_before_done_sentinel_is_read() {
        let mut parser = StreamParser::new();
        let mut input = String::new();
        input.push_str(&data_line("conv-1", "m0", "user", "question", None));
        input.push_str(&data_line("conv-1", "m1", "assistant", "partial", Some(false)));
        input.push_str(&data_line("conv-1", "m1", "assistant", "partial answer", Some(true)));
        input.push_str("data: [DONE]\n");

        let actions = parser.feed(input.as_bytes()).unwrap();
        let delivered: Vec<_> = actions
            .iter()
            .filter(|a| matches!(a, StreamAction::Deliver(_)))
            .collect();
        assert_eq!(delivered.len(), 2, "user echo must never be delivered");
        assert!(matches!(actions.last(), Some(StreamAction::Terminate)));
        assert!(parser.finished());

        // The sentinel was still buffered when the turn ended; feeding more
        // produces nothing.
        assert!(parser.feed(b"data: {broken json}\n").unwrap().is_empty());
        assert_eq!(parser.conversation_id(), "conv-1");
    }

    #[test]
    fn blank_lines_are_noops_and_do_not_corrupt_conversation_id() {
        let mut parser = StreamParser::new();
        let mut input = String::new();
        input.push_str(&data_line("conv-7", "m1", "assistant", "a", Some(false)));
        input.push_str("\n\r\n");
        input.push_str(&data_line("conv-7", "m1", "assistant", "ab", Some(false)));

        let actions = parser.feed(input.as_bytes()).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(parser.conversation_id(), "conv-7");
        assert!(!parser.finished());
    }

    #[test]
    fn done_sentinel_alone_terminates() {
        let mut parser = StreamParser::new();
        let actions = parser.feed(b"data: [DONE]\n").unwrap();
        assert!(matches!(actions.as_slice(), [StreamAction::Terminate]));
        assert!(parser.finished());
    }

    #[test]
    fn first_conversation_id_wins_on_mismatch() {
        let mut parser = StreamParser::new();
        parser
            .feed(data_line("conv-a", "m1", "assistant", "x", Some(false)).as_bytes())
            .unwrap();
        parser
            .feed(data_line("conv-b", "m1", "assistant", "xy", Some(false)).as_bytes())
            .unwrap();
        // Mismatch is logged, not fatal; the first id stays authoritative.
        assert_eq!(parser.conversation_id(), "conv-a");
    }

    #[test]
    fn lines_split_across_chunks_are_reassembled() {
        let mut parser = StreamParser::new();
        let line = data_line("conv-1", "m1", "assistant", "split across chunks", Some(false));
        let (head, tail) = line.split_at(line.len() / 2);

        assert!(parser.feed(head.as_bytes()).unwrap().is_empty());
        let actions = parser.feed(tail.as_bytes()).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(matches!(&actions[0], StreamAction::Deliver(event)
            if event.message.content.parts == ["split across chunks"]));
    }

    #[test]
    fn multibyte_character_split_across_chunks_is_reassembled() {
        let mut parser = StreamParser::new();
        let line = data_line("conv-1", "m1", "assistant", "héllo wörld", Some(false));
        let bytes = line.as_bytes();
        // Cut inside the two-byte encoding of 'é'.
        let split = line.find('é').unwrap() + 1;
        assert!(std::str::from_utf8(&bytes[..split]).is_err());

        assert!(parser.feed(&bytes[..split]).unwrap().is_empty());
        let actions = parser.feed(&bytes[split..]).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(matches!(&actions[0], StreamAction::Deliver(event)
            if event.message.content.parts == ["héllo wörld"]));
    }

    #[test]
    fn invalid_utf8_in_a_complete_line_is_fatal() {
        let mut parser = StreamParser::new();
        let err = parser.feed(b"data: \xff\xfe\n").unwrap_err();
        assert!(matches!(err, Error::Utf8(_)));
    }

    #[test]
    fn malformed_data_line_is_a_fatal_decode_error() {
        let mut parser = StreamParser::new();
        let err = parser.feed(b"data: {\"message\": oops}\n").unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn unrecognized_lines_are_keepalives() {
        let mut parser = StreamParser::new();
        let actions = parser.feed(b": ping\nevent: message\n").unwrap();
        assert!(actions.is_empty());
        assert!(!parser.finished());
    }

    #[test]
    fn system_and_tool_events_pass_without_actions() {
        let mut parser = StreamParser::new();
        let mut input = String::new();
        input.push_str(&data_line("conv-1", "m1", "system", "", None));
        input.push_str(&data_line("conv-1", "m2", "tool", "", None));
        let actions = parser.feed(input.as_bytes()).unwrap();
        assert!(actions.is_empty());
        assert_eq!(parser.conversation_id(), "conv-1");
    }

    #[test]
    fn eof_without_sentinel_finishes_normally() {
        let mut parser = StreamParser::new();
        parser
            .feed(data_line("conv-1", "m1", "assistant", "x", Some(false)).as_bytes())
            .unwrap();
        // Trailing partial line without a newline is still processed.
        let trailing = data_line("conv-1", "m1", "assistant", "xy", Some(false));
        parser.feed(trailing.trim_end().as_bytes()).unwrap();

        let (conversation_id, actions) = parser.finish().unwrap();
        assert_eq!(conversation_id, "conv-1");
        assert_eq!(actions.len(), 1);
    }
}
