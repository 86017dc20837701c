//! Prompt construction for arrangement generation.

use super::types::{ArrangementRequest, Message};

const SYSTEM_PROMPT: &str = r#"You transcribe songs into rehearsal arrangements for working musicians.
Reply with a single JSON object and nothing else: no prose, no markdown fences.
The object must have exactly this shape:
{
  "key": "musical key, e.g. \"A minor\"",
  "tempo": integer beats per minute,
  "time_signature": "e.g. \"4/4\"",
  "confidence": number between 0 and 1 describing how sure you are of the content,
  "source": "short description of where the content comes from",
  "sections": [
    {
      "kind": one of "intro", "verse", "pre_chorus", "chorus", "bridge", "solo", "interlude", "outro", "other",
      "label": "optional display label",
      "lines": [
        {"type": "lyric", "text": "lyric text", "chords": "optional chord string"},
        {"type": "annotation", "text": "performance note"}
      ]
    }
  ]
}
If you do not know the song, return a low confidence instead of inventing lyrics."#;

pub fn system_message() -> Message {
    Message::system(SYSTEM_PROMPT)
}

pub fn user_message(request: &ArrangementRequest) -> Message {
    Message::user(format!(
        "Song title: {}\nArtist: {}\nProduce the arrangement JSON.",
        request.title.trim(),
        request.artist.trim()
    ))
}

pub fn build_messages(request: &ArrangementRequest) -> Vec<Message> {
    vec![system_message(), user_message(request)]
}
