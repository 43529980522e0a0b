pub(crate) fn default_log_level() -> crate::config::LogLevel {
    crate::config::LogLevel::Debug
}

pub(crate) fn default_max_chunk_chars() -> usize {
    crate::chunker::DEFAULT_MAX_CHUNK_CHARS
}

pub(crate) fn default_break_tolerance() -> f32 {
    crate::chunker::DEFAULT_BREAK_TOLERANCE
}

pub(crate) fn default_cancel_settle_ms() -> u64 {
    50
}

pub(crate) fn default_retry_delay_ms() -> u64 {
    100
}

pub(crate) fn default_retry_max_chars() -> usize {
    200
}

pub(crate) fn default_voice_poll_attempts() -> u32 {
    10
}

pub(crate) fn default_voice_poll_interval_ms() -> u64 {
    100
}

pub(crate) fn default_preferred_language() -> String {
    "es".to_string()
}

pub(crate) fn default_rate() -> f32 {
    1.0
}

pub(crate) fn default_pitch() -> f32 {
    1.0
}

pub(crate) fn default_volume() -> f32 {
    1.0
}

pub(crate) fn default_words_per_minute() -> u32 {
    170
}

pub(crate) fn default_max_file_size_mb() -> u64 {
    50
}

pub(crate) fn default_max_pdf_pages() -> usize {
    3000
}

pub(crate) fn default_max_word_pages() -> usize {
    50
}

pub(crate) fn default_chars_per_page_estimate() -> usize {
    2000
}

pub(crate) fn default_cache_dir() -> String {
    ".cache".to_string()
}
