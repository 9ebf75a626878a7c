// Cross-cutting prompt fragments shared by every AI feature.
// Feature-specific templates live next to the feature (see analysis/prompts.rs).

/// Appended to any prompt whose output is decoded as JSON.
pub const JSON_ONLY_INSTRUCTION: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Keeps generated career content anchored to what the candidate actually wrote.
pub const FACTUAL_INSTRUCTION: &str = "Base every statement strictly on the CV provided. \
    Do NOT invent employers, dates, qualifications or metrics that are not in the CV.";
