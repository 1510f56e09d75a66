use super::LlmClient;
use serde_json::Value;

/// Locate the JSON payload inside raw LLM output. Tries a ```json fence,
/// then a bare ``` fence opening on `{`, then the outermost brace pair.
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let json_start = start + "```json".len();
        let rest = &text[json_start..];
        if let Some(end) = rest.find("```") {
            let candidate = rest[..end].trim();
            if !candidate.is_empty() {
                return Some(candidate);
            }
        }
    }

    if let Some(start) = text.find("```\n{") {
        let json_start = start + "```\n".len();
        let rest = &text[json_start..];
        if let Some(end) = rest.find("```") {
            let candidate = rest[..end].trim();
            if !candidate.is_empty() {
                return Some(candidate);
            }
        }
    }

    let open = text.find('{')?;
    let close = text.rfind('}')?;
    if close > open {
        return Some(&text[open..=close]);
    }

    None
}

/// Parse the JSON object embedded in raw LLM output, if any.
pub fn parse_json_response(text: &str) -> Option<Value> {
    let payload = extract_json(text)?;
    let value: Value = serde_json::from_str(payload).ok()?;
    value.is_object().then_some(value)
}

/// Bounded JSON-or-repair loop: one normal attempt, one repair attempt with
/// an explicit re-emit prompt, then give up. Returns `Ok(None)` when both
/// attempts produced unparseable output — the caller supplies its
/// deterministic fallback. Transport errors propagate as `Err`.
pub async fn generate_with_repair<T, F>(
    client: &dyn LlmClient,
    system_prompt: &str,
    user_prompt: &str,
    parse: F,
) -> anyhow::Result<Option<T>>
where
    F: Fn(&str) -> Option<T>,
{
    let first = client.generate(system_prompt, user_prompt).await?;
    if let Some(parsed) = parse(&first) {
        return Ok(Some(parsed));
    }

    tracing::warn!(
        provider = client.name(),
        "response was not valid JSON, issuing repair prompt"
    );

    let repair_prompt = format!(
        "Your previous response could not be parsed as JSON:\n\n{first}\n\n\
         Re-emit ONLY a single valid JSON object matching the required schema, \
         with no markdown and no extra text."
    );
    let second = client.generate(system_prompt, &repair_prompt).await?;
    Ok(parse(&second))
}
