use chrono::NaiveDate;
use serde::{de, Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use std::fmt;

use super::setup::SetupId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum GameResult {
    Win,
    Draw,
    Loss,
}

impl GameResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameResult::Win => "win",
            GameResult::Draw => "draw",
            GameResult::Loss => "loss",
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opponent as known to the opponent directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Opponent {
    pub opponent_id: i64,
    pub opponent_name: String,
}

/// Metadata of one played game, before it is attached to a setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameDetails {
    pub date_played: NaiveDate,
    pub opponent_id: Option<i64>,
    pub opponent_name: String,
    pub result: GameResult,
    pub moves: u32,
    pub noob_killer: bool,
}

impl GameDetails {
    pub fn against(opponent: &Opponent, date_played: NaiveDate, result: GameResult) -> Self {
        Self {
            date_played,
            opponent_id: Some(opponent.opponent_id),
            opponent_name: opponent.opponent_name.clone(),
            result,
            moves: 0,
            noob_killer: false,
        }
    }

    pub fn with_moves(mut self, moves: u32) -> Self {
        self.moves = moves;
        self
    }

    pub fn with_noob_killer(mut self, noob_killer: bool) -> Self {
        self.noob_killer = noob_killer;
        self
    }
}

/// A committed game record row.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct GameRecord {
    pub record_id: i64,
    pub setup_id: SetupId,
    pub date_played: NaiveDate,
    pub opponent_id: Option<i64>,
    pub opponent_name: String,
    pub result: GameResult,
    pub moves: i64,
    pub noob_killer: bool,
}

/// Optional criteria for selecting game records. Unset fields do not filter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetupFilters {
    pub opponent: Option<String>,
    pub result: Option<GameResult>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub noob_killer: Option<bool>,
    pub min_moves: Option<i64>,
    pub max_moves: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Accepts `true`/`false` as well as the `1`/`0` stored in game records.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    match Option::<Flag>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Flag::Bool(value)) => Ok(Some(value)),
        Some(Flag::Int(1)) => Ok(Some(true)),
        Some(Flag::Int(0)) => Ok(Some(false)),
        Some(Flag::Text(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "1" | "true" => Ok(Some(true)),
            "0" | "false" => Ok(Some(false)),
            other => Err(de::Error::custom(format!("invalid noob_killer flag: {}", other))),
        },
        Some(Flag::Int(other)) => Err(de::Error::custom(format!(
            "invalid noob_killer flag: {}",
            other
        ))),
    }
}

impl SetupFilters {
    pub fn is_empty(&self) -> bool {
        self.opponent.is_none()
            && self.result.is_none()
            && self.noob_killer.is_none()
            && self.min_moves.is_none()
            && self.max_moves.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_result_serializes_lowercase() {
        let json = serde_json::to_string(&GameResult::Draw).unwrap();
        assert_eq!(json, "\"draw\"");
        let parsed: GameResult = serde_json::from_str("\"loss\"").unwrap();
        assert_eq!(parsed, GameResult::Loss);
    }

    fn filters_from_query(query: &str) -> Option<SetupFilters> {
        let uri: axum::http::Uri = format!("http://localhost/api/v1/setups?{}", query)
            .parse()
            .unwrap();
        axum::extract::Query::<SetupFilters>::try_from_uri(&uri)
            .ok()
            .map(|q| q.0)
    }

    #[test]
    fn noob_killer_accepts_numeric_and_word_flags() {
        assert_eq!(filters_from_query("noob_killer=1").unwrap().noob_killer, Some(true));
        assert_eq!(filters_from_query("noob_killer=0").unwrap().noob_killer, Some(false));
        assert_eq!(filters_from_query("noob_killer=true").unwrap().noob_killer, Some(true));
        assert_eq!(filters_from_query("noob_killer=false").unwrap().noob_killer, Some(false));
        assert_eq!(filters_from_query("opponent=bob").unwrap().noob_killer, None);
        assert!(filters_from_query("noob_killer=maybe").is_none());

        let filters: SetupFilters = serde_json::from_str(r#"{"noob_killer": 1}"#).unwrap();
        assert_eq!(filters.noob_killer, Some(true));
    }

    #[test]
    fn default_filters_are_empty() {
        assert!(SetupFilters::default().is_empty());
        let filters = SetupFilters {
            min_moves: Some(10),
            ..Default::default()
        };
        assert!(!filters.is_empty());
    }

    #[test]
    fn details_builder_copies_opponent() {
        let opponent = Opponent {
            opponent_id: 10,
            opponent_name: "Sekertzis1973".to_string(),
        };
        let date = NaiveDate::from_ymd_opt(2025, 4, 24).unwrap();
        let details = GameDetails::against(&opponent, date, GameResult::Win)
            .with_moves(777)
            .with_noob_killer(true);
        assert_eq!(details.opponent_id, Some(10));
        assert_eq!(details.opponent_name, "Sekertzis1973");
        assert_eq!(details.moves, 777);
        assert!(details.noob_killer);
    }
}
