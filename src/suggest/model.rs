use serde::Deserialize;

/// Response shape of the generative-text endpoint. Only the nested text
/// path is of interest; everything else is ignored.
#[derive(Deserialize, Debug, Default)]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug, Default)]
pub struct Candidate {
    #[serde(default)]
    pub content: Content,
}

#[derive(Deserialize, Debug, Default)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Deserialize, Debug, Default)]
pub struct Part {
    pub text: Option<String>,
}
