pub mod config;
pub mod daemon;
pub mod export;
pub mod fleet;
pub mod health;
pub mod logs;
pub mod sensor;
pub mod trend;

pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
