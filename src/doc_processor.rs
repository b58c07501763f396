use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Literal token placed between chunks in a cache file.
pub const CHUNK_SEPARATOR: &str = "\n\n---CHUNK_SEPARATOR---\n\n";

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum DocError {
    #[error("No text could be extracted from the document: {0}")]
    Extraction(String),
    #[error("Chunk cache for document {document_id} is unavailable: {source}")]
    CacheRead {
        document_id: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write chunk cache: {0}")]
    CacheWrite(#[from] io::Error),
}

/// Pull the embedded text layer out of a PDF.
///
/// The parser is known to panic on some malformed files, so the panic is
/// caught and reported as an extraction failure instead of taking down the
/// worker thread.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, DocError> {
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(DocError::Extraction(format!("PDF parse error: {}", e))),
        Err(_) => Err(DocError::Extraction(
            "PDF parser aborted on malformed input".into(),
        )),
    }
}

/// Turn a PDF into its ordered, overlapping chunk sequence.
pub fn extract(bytes: &[u8], chunk_size: usize, overlap: usize) -> Result<Vec<String>, DocError> {
    let text = extract_pdf_text(bytes)?;
    chunks_from_text(&text, chunk_size, overlap)
}

/// Chunk already-extracted text, failing when nothing usable remains.
pub fn chunks_from_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, DocError> {
    let chunks = split_text(text, chunk_size, overlap);
    if chunks.is_empty() {
        return Err(DocError::Extraction(
            "document has no embedded text layer".into(),
        ));
    }
    Ok(chunks)
}

/// Split text on line boundaries and coalesce the lines into chunks of at
/// most `chunk_size` characters. Up to `overlap` trailing characters of each
/// chunk (whole lines only) are carried into the next one.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size - 1);

    let mut chunks = Vec::new();
    // (line, char count); window_len counts the joining newlines too
    let mut window: VecDeque<(&str, usize)> = VecDeque::new();
    let mut window_len = 0usize;

    for line in text.split('\n') {
        if line.trim().is_empty() {
            continue;
        }
        let line_len = line.chars().count();

        if line_len > chunk_size {
            push_joined(&mut chunks, &window);
            window.clear();
            window_len = 0;
            chunks.extend(window_chunks(line, chunk_size, overlap));
            continue;
        }

        if !window.is_empty() && window_len + 1 + line_len > chunk_size {
            push_joined(&mut chunks, &window);
            while window_len > overlap || (window_len > 0 && window_len + 1 + line_len > chunk_size)
            {
                let Some((_, front_len)) = window.pop_front() else {
                    break;
                };
                window_len -= front_len;
                if !window.is_empty() {
                    window_len -= 1;
                }
            }
        }

        window_len += if window.is_empty() { line_len } else { line_len + 1 };
        window.push_back((line, line_len));
    }
    push_joined(&mut chunks, &window);

    chunks
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<(&str, usize)>) {
    if window.is_empty() {
        return;
    }
    let joined = window
        .iter()
        .map(|(line, _)| *line)
        .collect::<Vec<_>>()
        .join("\n");
    let joined = joined.trim();
    if !joined.is_empty() {
        chunks.push(joined.to_string());
    }
}

/// Fixed-size character windows for a single line longer than a chunk.
fn window_chunks(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim().to_string();
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
        if end >= chars.len() {
            break;
        }
        start += chunk_size - overlap;
    }

    chunks
}

pub fn serialize_chunks(chunks: &[String]) -> String {
    chunks.join(CHUNK_SEPARATOR)
}

pub fn deserialize_chunks(blob: &str) -> Vec<String> {
    blob.split(CHUNK_SEPARATOR)
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .map(String::from)
        .collect()
}

/// One cache file per document, replaced wholesale on every (re)processing.
#[derive(Debug, Clone)]
pub struct ChunkCache {
    dir: PathBuf,
}

impl ChunkCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, document_id: &str) -> PathBuf {
        self.dir.join(format!("{}.txt", document_id))
    }

    /// Write the chunks through a temp file and rename it into place.
    pub fn write(&self, document_id: &str, chunks: &[String]) -> Result<PathBuf, DocError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(document_id);
        let tmp_path = path.with_extension("txt.tmp");
        fs::write(&tmp_path, serialize_chunks(chunks))?;
        fs::rename(&tmp_path, &path)?;
        Ok(path)
    }

    pub fn read(&self, document_id: &str) -> Result<Vec<String>, DocError> {
        let blob = fs::read_to_string(self.path_for(document_id)).map_err(|source| {
            DocError::CacheRead {
                document_id: document_id.to_string(),
                source,
            }
        })?;
        Ok(deserialize_chunks(&blob))
    }

    pub fn remove(&self, document_id: &str) -> Result<(), DocError> {
        match fs::remove_file(self.path_for(document_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
