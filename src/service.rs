//! JSON-lines request loop.
//!
//! One request per input line, one response per output line. A failed
//! request never ends the loop; it answers with an error object instead.

use log::{debug, warn};
use serde::Serialize;
use std::io::{BufRead, Write};

use crate::recommender::Recommender;
use crate::track::{RecommendationRequest, RecommendationResponse};

/// Error kind reported for lines that are not a valid request
pub const INVALID_REQUEST: &str = "invalid_request";

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

/// Answer a single request line.
pub fn handle_line(recommender: &Recommender, line: &str) -> Result<String, serde_json::Error> {
    let request: RecommendationRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected malformed request: {e}");
            return serde_json::to_string(&ErrorBody {
                error: INVALID_REQUEST,
                message: e.to_string(),
            });
        }
    };

    match recommender.recommend(&request) {
        Ok(recommendations) => serde_json::to_string(&RecommendationResponse { recommendations }),
        Err(e) => {
            warn!("Request failed: {e}");
            serde_json::to_string(&ErrorBody {
                error: e.kind(),
                message: e.to_string(),
            })
        }
    }
}

/// Serve until `input` is exhausted. Blank lines are skipped.
///
/// Returns the number of requests answered.
pub fn serve<R: BufRead, W: Write>(recommender: &Recommender, mut input: R, mut output: W) -> anyhow::Result<usize> {
    let mut answered = 0;
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        if input.read_until(b'\n', &mut buffer)? == 0 {
            break;
        }
        let response = match std::str::from_utf8(&buffer) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => handle_line(recommender, line)?,
            Err(e) => {
                warn!("Rejected request that is not UTF-8: {e}");
                serde_json::to_string(&ErrorBody {
                    error: INVALID_REQUEST,
                    message: format!("request is not valid UTF-8: {e}"),
                })?
            }
        };
        writeln!(output, "{response}")?;
        output.flush()?;
        answered += 1;
        debug!("Answered request #{answered}");
    }
    Ok(answered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::corpus::tests::row;
    use serde_json::Value;

    fn prepared() -> Recommender {
        let recommender = Recommender::new(EngineConfig::default());
        recommender
            .prepare(vec![
                row("a", "pop", 70, 0.2, "2001"),
                row("b", "rock", 30, 0.8, "2002"),
            ])
            .unwrap();
        recommender
    }

    #[test]
    fn test_errors_are_typed_objects() {
        let unprepared = Recommender::new(EngineConfig::default());
        let value: Value = serde_json::from_str(&handle_line(&unprepared, r#"{"songs": [{}]}"#).unwrap()).unwrap();
        assert_eq!(value["error"], "not_prepared");

        let recommender = prepared();
        let value: Value = serde_json::from_str(&handle_line(&recommender, r#"{"songs": []}"#).unwrap()).unwrap();
        assert_eq!(value["error"], "no_seeds");

        let value: Value = serde_json::from_str(&handle_line(&recommender, "not json").unwrap()).unwrap();
        assert_eq!(value["error"], INVALID_REQUEST);
        assert!(value["message"].as_str().is_some());
    }

    #[test]
    fn test_serve_answers_each_line() {
        let recommender = prepared();
        let input = concat!(
            r#"{"songs": [{"audio_features": {"energy": 0.3}, "playlist_genre": "pop"}], "n_recommendations": 1}"#,
            "\n\n",
            r#"{"songs": [{"release_date": "soon"}]}"#,
            "\n",
        );
        let mut output = Vec::new();
        let answered = serve(&recommender, input.as_bytes(), &mut output).unwrap();
        assert_eq!(answered, 2);

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0]["recommendations"].as_array().unwrap().len(), 1);
        assert_eq!(lines[1]["error"], "invalid_release_date");
    }

    #[test]
    fn test_serve_survives_non_utf8_line() {
        let recommender = prepared();
        let valid = r#"{"songs": [{"playlist_genre": "pop"}], "n_recommendations": 1}"#;
        let mut input = Vec::new();
        input.extend_from_slice(valid.as_bytes());
        input.extend_from_slice(b"\n{\"songs\": [{\"lyrics\": \"\xff\xfe\"}]}\n");
        input.extend_from_slice(valid.as_bytes());
        input.push(b'\n');

        let mut output = Vec::new();
        let answered = serve(&recommender, input.as_slice(), &mut output).unwrap();
        assert_eq!(answered, 3);

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1]["error"], INVALID_REQUEST);
        assert_eq!(lines[0], lines[2]);
        assert_eq!(lines[2]["recommendations"].as_array().unwrap().len(), 1);
    }
}
