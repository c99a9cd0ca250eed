//! Reading match results out of scoreboard screenshots with a vision model behind an OpenAI-compatible API.

use {
    base64::Engine as _,
    lazy_regex::regex_captures,
    crate::{
        prelude::*,
        submission::{
            MATCH_SIZE,
            MatchSubmission,
            PlayerEntry,
            TeamLabel,
        },
    },
};

const INSTRUCTIONS: &str = "You read end-of-game scoreboard screenshots of 5v5 matches. \
Answer with a single JSON object and nothing else: \
{\"winningTeam\": \"TEAM_A\" or \"TEAM_B\", \"players\": [...]} where players lists all ten players in scoreboard order, \
the five players of the first team first. Each player is an object with the keys \
accountName, accountTag, team (TEAM_A or TEAM_B), kills, deaths, assists, and when visible \
gold, damage, durationSeconds, championName and roleName. \
If the image is not a finished match scoreboard, answer {\"players\": []}.";

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Json(#[from] serde_json::Error),
    #[error(transparent)] Reqwest(#[from] reqwest::Error),
    #[error("no match result could be read from the image")]
    NoResult,
    #[error("the image shows {0} players instead of {size}", size = MATCH_SIZE)]
    WrongEntryCount(usize),
}

#[async_trait]
pub(crate) trait MatchExtractor: Send + Sync {
    /// `hints` are the `name#tag` of accounts already known in `scope`, to help with hard to read names.
    async fn extract(&self, image: Vec<u8>, scope: GuildId, hints: Vec<String>) -> Result<MatchSubmission, Error>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    response_format: ResponseFormat,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractedMatch {
    winning_team: Option<TeamLabel>,
    #[serde(default)]
    players: Vec<PlayerEntry>,
}

/// Guesses the media type from the file signature, falling back to PNG.
fn media_type(image: &[u8]) -> &'static str {
    match image {
        [0xff, 0xd8, 0xff, ..] => "image/jpeg",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        _ => "image/png",
    }
}

/// Turns the model's answer into a submission. Code fences around the JSON are tolerated.
pub(crate) fn parse_reply(reply: &str, scope: GuildId) -> Result<MatchSubmission, Error> {
    let json = regex_captures!(r"(?s)```(?:json)?\s*(.*?)\s*```", reply).map_or(reply.trim(), |(_, inner)| inner);
    let ExtractedMatch { winning_team, players } = serde_json::from_str(json)?;
    if players.is_empty() { return Err(Error::NoResult) }
    let Some(winning_team) = winning_team else { return Err(Error::NoResult) };
    if players.len() != MATCH_SIZE { return Err(Error::WrongEntryCount(players.len())) }
    Ok(MatchSubmission { scope, winning_team, entries: players })
}

pub(crate) struct VisionClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl VisionClient {
    pub(crate) fn new(http_client: reqwest::Client, config: &Config) -> Self {
        Self {
            http_client,
            endpoint: config.extraction.endpoint.trim_end_matches('/').to_owned(),
            api_key: config.extraction.api_key.clone(),
            model: config.extraction.model.clone(),
        }
    }
}

#[async_trait]
impl MatchExtractor for VisionClient {
    async fn extract(&self, image: Vec<u8>, scope: GuildId, hints: Vec<String>) -> Result<MatchSubmission, Error> {
        let data_url = format!("data:{};base64,{}", media_type(&image), base64::engine::general_purpose::STANDARD.encode(&image));
        let hint_text = if hints.is_empty() {
            format!("No accounts are registered yet.")
        } else {
            format!("Accounts registered in this community, use their exact spelling when a name matches: {}", hints.join(", "))
        };
        let request = ChatRequest {
            model: &self.model,
            response_format: ResponseFormat { kind: "json_object" },
            messages: vec![
                Message { role: "system", content: vec![ContentPart::Text { text: INSTRUCTIONS }] },
                Message { role: "user", content: vec![
                    ContentPart::Text { text: &hint_text },
                    ContentPart::ImageUrl { image_url: ImageUrl { url: data_url } },
                ] },
            ],
        };
        let response = self.http_client.post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send().await?
            .error_for_status()?
            .json::<ChatResponse>().await?;
        let content = response.choices.into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(Error::NoResult)?;
        log::debug!("extraction reply for {scope}: {content}");
        parse_reply(&content, scope)
    }
}
