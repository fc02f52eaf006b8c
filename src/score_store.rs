use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Optional persistence boundary. The room records final scores through
/// this; nothing in the core depends on a save succeeding.
pub trait ScoreStore: Send + Sync {
    fn save_score(&self, name: &str, score: i32, lines: u32, duration_sec: u64);
    fn top_scores(&self, limit: Option<usize>) -> ScoresResponse;
}

#[derive(Clone, Debug, Serialize)]
pub struct ScoreboardEntry {
    pub name: String,
    pub games: u64,
    #[serde(rename = "bestScore")]
    pub best_score: i32,
    #[serde(rename = "avgScore")]
    pub avg_score: f64,
    #[serde(rename = "totalLines")]
    pub total_lines: u64,
    #[serde(rename = "lastDurationSec")]
    pub last_duration_sec: u64,
    #[serde(rename = "updatedAtMs")]
    pub updated_at_ms: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ScoresResponse {
    #[serde(rename = "generatedAt")]
    pub generated_at_iso: String,
    pub entries: Vec<ScoreboardEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredScoreEntry {
    name: String,
    games: u64,
    #[serde(rename = "totalScore", alias = "total_score")]
    total_score: i64,
    #[serde(rename = "bestScore", alias = "best_score")]
    best_score: i32,
    #[serde(rename = "totalLines", alias = "total_lines")]
    total_lines: u64,
    #[serde(rename = "lastDurationSec", alias = "last_duration_sec")]
    last_duration_sec: u64,
    #[serde(rename = "updatedAtMs", alias = "updated_at_ms")]
    updated_at_ms: u64,
}

#[derive(Clone, Debug, Serialize)]
struct ScoreStoreFile {
    version: u8,
    players: HashMap<String, StoredScoreEntry>,
}

#[derive(Clone, Debug, Deserialize)]
struct ScoreStoreFileRaw {
    version: u8,
    players: HashMap<String, serde_json::Value>,
}

pub struct FileScoreStore {
    file_path: PathBuf,
    players: Mutex<HashMap<String, StoredScoreEntry>>,
}

impl FileScoreStore {
    pub fn new(file_path: PathBuf) -> Self {
        let players = load_players(&file_path);
        Self {
            file_path,
            players: Mutex::new(players),
        }
    }

    fn save(&self, players: &HashMap<String, StoredScoreEntry>) {
        if let Some(parent) = self.file_path.parent() {
            if let Err(error) = fs::create_dir_all(parent) {
                eprintln!(
                    "[score-store] failed to create parent dir {}: {error}",
                    parent.display()
                );
                return;
            }
        }

        let payload = ScoreStoreFile {
            version: 1,
            players: players.clone(),
        };
        match serde_json::to_string_pretty(&payload) {
            Ok(text) => {
                if let Err(error) = fs::write(&self.file_path, text) {
                    eprintln!(
                        "[score-store] failed to write {}: {error}",
                        self.file_path.display()
                    );
                }
            }
            Err(error) => {
                eprintln!(
                    "[score-store] failed to serialize payload for {}: {error}",
                    self.file_path.display()
                );
            }
        }
    }
}

impl ScoreStore for FileScoreStore {
    fn save_score(&self, name: &str, score: i32, lines: u32, duration_sec: u64) {
        let key = score_key(name);
        if key.is_empty() {
            return;
        }
        let now_ms = now_ms();

        let mut players = self.players.lock().expect("score store lock");
        let entry = players.entry(key).or_insert_with(|| StoredScoreEntry {
            name: name.trim().to_string(),
            games: 0,
            total_score: 0,
            best_score: 0,
            total_lines: 0,
            last_duration_sec: 0,
            updated_at_ms: now_ms,
        });

        entry.name = name.trim().to_string();
        entry.games += 1;
        entry.total_score += score.max(0) as i64;
        entry.best_score = entry.best_score.max(score);
        entry.total_lines += lines as u64;
        entry.last_duration_sec = duration_sec;
        entry.updated_at_ms = now_ms;

        self.save(&players);
    }

    fn top_scores(&self, limit: Option<usize>) -> ScoresResponse {
        let normalized_limit = limit.unwrap_or(10).clamp(1, 100);
        let players = self.players.lock().expect("score store lock");
        let mut entries: Vec<ScoreboardEntry> = players
            .values()
            .map(|entry| {
                let games = entry.games.max(1) as f64;
                ScoreboardEntry {
                    name: entry.name.clone(),
                    games: entry.games,
                    best_score: entry.best_score,
                    avg_score: entry.total_score as f64 / games,
                    total_lines: entry.total_lines,
                    last_duration_sec: entry.last_duration_sec,
                    updated_at_ms: entry.updated_at_ms,
                }
            })
            .collect();

        entries.sort_by(|a, b| {
            b.best_score
                .cmp(&a.best_score)
                .then_with(|| b.total_lines.cmp(&a.total_lines))
                .then_with(|| cmp_desc_f64(a.avg_score, b.avg_score))
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        entries.truncate(normalized_limit);

        ScoresResponse {
            generated_at_iso: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            entries,
        }
    }
}

fn cmp_desc_f64(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

fn load_players(path: &Path) -> HashMap<String, StoredScoreEntry> {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                eprintln!("[score-store] failed to read {}: {error}", path.display());
            }
            return HashMap::new();
        }
    };
    let parsed: ScoreStoreFileRaw = match serde_json::from_str::<ScoreStoreFileRaw>(&text) {
        Ok(value) if value.version == 1 => value,
        Ok(value) => {
            eprintln!(
                "[score-store] unsupported version {} at {}",
                value.version,
                path.display()
            );
            return HashMap::new();
        }
        Err(error) => {
            eprintln!("[score-store] failed to parse {}: {error}", path.display());
            return HashMap::new();
        }
    };

    let mut sanitized = HashMap::<String, StoredScoreEntry>::new();
    for (player_key, raw_value) in parsed.players {
        let value: StoredScoreEntry = match serde_json::from_value(raw_value) {
            Ok(entry) => entry,
            Err(error) => {
                eprintln!(
                    "[score-store] failed to parse player entry '{}' in {}: {error}",
                    player_key,
                    path.display()
                );
                continue;
            }
        };
        let Some(normalized) = sanitize_stored_entry(value) else {
            continue;
        };
        let key = score_key(&normalized.name);
        if key.is_empty() {
            continue;
        }

        match sanitized.get_mut(&key) {
            Some(current) => {
                current.name = normalized.name;
                current.games += normalized.games;
                current.total_score += normalized.total_score;
                current.best_score = current.best_score.max(normalized.best_score);
                current.total_lines += normalized.total_lines;
                current.last_duration_sec = normalized.last_duration_sec;
                current.updated_at_ms = current.updated_at_ms.max(normalized.updated_at_ms);
            }
            None => {
                sanitized.insert(key, normalized);
            }
        }
    }

    sanitized
}

fn sanitize_stored_entry(value: StoredScoreEntry) -> Option<StoredScoreEntry> {
    let normalized_name = value.name.trim().to_string();
    if normalized_name.is_empty() {
        return None;
    }
    if value.total_score < 0 {
        return None;
    }
    Some(StoredScoreEntry {
        name: normalized_name,
        games: value.games,
        total_score: value.total_score,
        best_score: value.best_score.max(0),
        total_lines: value.total_lines,
        last_duration_sec: value.last_duration_sec,
        updated_at_ms: value.updated_at_ms,
    })
}

fn score_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
