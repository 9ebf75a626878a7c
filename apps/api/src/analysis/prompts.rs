// All LLM prompt templates for CV analysis and cover letters.
// Reuses cross-cutting fragments from llm_client::prompts.

/// CV analysis prompt template.
/// Replace: {cv_text}, {job_section}, {industry_field}, {factual_instruction}, {json_only}
pub const CV_ANALYSIS_PROMPT_TEMPLATE: &str = r#"You are an expert career coach and recruiter reviewing a CV.

{factual_instruction}

CV:
{cv_text}
{job_section}
Evaluate the CV and return a JSON object with this EXACT schema:
{
  "overallScore": 78,
  "atsCompatibility": 82,
  "readabilityScore": 74,
  "strengths": ["Quantified achievements in recent roles"],
  "weaknesses": ["Summary section is generic"],
  "suggestions": ["Lead each bullet with a strong action verb"],
  "missingKeywords": ["stakeholder management"]{industry_field}
}

Rules:
- All scores are integers from 0 to 100.
- "atsCompatibility" measures how reliably an applicant tracking system can parse the CV.
- "missingKeywords" lists skills or terms a recruiter would expect but the CV lacks.
- Give 3 to 6 items for strengths, weaknesses and suggestions.

{json_only}"#;

/// Inserted into the analysis prompt when a job description is supplied.
/// Replace: {job_description}
pub const JOB_SECTION_TEMPLATE: &str = r#"
TARGET JOB DESCRIPTION:
{job_description}
"#;

/// Extra schema field requested only when a job description is supplied.
pub const INDUSTRY_MATCH_FIELD: &str = r#",
  "industryMatch": 70"#;

/// Cover letter prompt template.
/// Replace: {cv_text}, {job_description}, {factual_instruction}
pub const COVER_LETTER_PROMPT_TEMPLATE: &str = r#"You are an expert career writer. Write a professional cover letter for the candidate below, applying to the job described.

{factual_instruction}

CV:
{cv_text}

JOB DESCRIPTION:
{job_description}

Requirements:
- 250 to 350 words.
- Open with the specific role and why the candidate is a strong match.
- Reference two or three concrete achievements from the CV that map to the job's requirements.
- Close with a confident call to action.
- Plain text only: no subject line, no placeholders in square brackets, no markdown."#;
