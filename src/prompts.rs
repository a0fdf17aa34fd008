//! Centralized prompt definitions for the reasoning pipeline
//!
//! Every prompt sent to the text-generation service is built here so the
//! wording can be reviewed, versioned and tested in one place.

/// Instructions for breaking a query into numbered reasoning steps.
pub const REASONING_STEPS_INSTRUCTIONS: &str = r#"Provide 3-5 reasoning steps in this exact format:
1. [Step description]
2. [Step description]
3. [Step description]

Each step should be a single, clear thought or action needed to answer the query."#;

/// Output contract for the quality grader.
pub const QUALITY_VERIFICATION_FORMAT: &str = r#"Respond ONLY with JSON in this exact format:
{"correctness": 0.0, "completeness": 0.0, "clarity": 0.0}"#;

/// Output contract for pattern extraction.
pub const PATTERN_EXTRACTION_FORMAT: &str = r#"Provide your analysis in this exact JSON format:
{
    "pattern_type": "type of reasoning pattern (e.g., 'factual_lookup', 'multi_step_reasoning', 'comparative_analysis')",
    "domain": "domain or topic area (e.g., 'geography', 'mathematics', 'history')",
    "reasoning_steps": [
        "step 1 description",
        "step 2 description",
        "step 3 description"
    ],
    "success_indicators": [
        "what made this response high quality",
        "key characteristics to replicate"
    ],
    "applicability": "when this pattern should be applied",
    "template": "generalized template with placeholders like {{query_topic}}, {{key_facts}}, {{conclusion}}"
}

Respond ONLY with valid JSON, no additional text."#;

/// Prompt asking the generator for numbered reasoning steps.
///
/// Optional sections are appended in a fixed order: learned pattern guidance
/// and preference context before the task, refinement instructions and
/// truncated history after it.
pub fn reasoning_steps_prompt(
    query: &str,
    pattern_guidance: Option<&str>,
    preference_context: Option<&str>,
    refinement_prompt: Option<&str>,
    history: Option<&str>,
) -> String {
    let mut prompt = String::new();

    if let Some(preferences) = non_empty(preference_context) {
        prompt.push_str(preferences);
        prompt.push('\n');
    }
    if let Some(guidance) = non_empty(pattern_guidance) {
        prompt.push_str(guidance);
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "You are a reasoning assistant. Break down the following query into clear, logical reasoning steps.\n\nQuery: {}\n\n{}\n",
        query, REASONING_STEPS_INSTRUCTIONS
    ));

    if let Some(refinement) = non_empty(refinement_prompt) {
        prompt.push('\n');
        prompt.push_str(refinement);
    }
    if let Some(history) = non_empty(history) {
        prompt.push_str(&format!("\n\nPrevious context: {}", history));
    }

    prompt
}

/// Prompt asking the generator for the final answer given its steps.
pub fn response_prompt(
    query: &str,
    steps_text: &str,
    preference_context: Option<&str>,
    refinement_prompt: Option<&str>,
    history: Option<&str>,
) -> String {
    let mut prompt = String::new();

    if let Some(preferences) = non_empty(preference_context) {
        prompt.push_str(preferences);
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "Based on the following reasoning steps, provide a clear, concise answer to the user's query.\n\nQuery: {}\n\nReasoning Steps:\n{}\n\nProvide a direct answer that incorporates the reasoning above. Be specific and helpful.\n",
        query, steps_text
    ));

    if let Some(refinement) = non_empty(refinement_prompt) {
        prompt.push('\n');
        prompt.push_str(refinement);
    }
    if let Some(history) = non_empty(history) {
        prompt.push_str(&format!("\n\nPrevious context: {}", history));
    }

    prompt
}

/// Grader prompt for the model-based half of the quality score.
pub fn quality_verification_prompt(query: &str, response: &str) -> String {
    format!(
        r#"You are a quality assessor. Rate this response on these criteria (0.0-1.0):

Query: "{query}"

Response: "{response}"

Rate on these criteria:
1. Correctness: Is the information accurate and factually correct? If the query is vague or lacks a concrete subject (e.g., "What?", "tell me", "stuff", "thing"), score LOW (0.3-0.4) because a vague query cannot yield a correct, specific answer.
2. Completeness: Does it fully answer the question without omitting key information? If the query is vague or missing context, the response cannot be complete, score LOW (0.3-0.4).
3. Clarity: Is it clear, well-structured, and easy to understand?

{format}
"#,
        query = query,
        response = response,
        format = QUALITY_VERIFICATION_FORMAT
    )
}

/// Prompt distilling a high-quality answer into a reusable pattern.
pub fn pattern_extraction_prompt(query: &str, response: &str, quality_score: f64) -> String {
    format!(
        r#"You are an expert at identifying reasoning patterns. Analyze this query-response pair and extract the underlying reasoning pattern.

Query: {query}
Response: {response}
Quality Score: {quality_score}

Extract a reusable pattern by identifying:
1. The type of question being asked
2. The reasoning steps used
3. The information sources referenced
4. The structure of the response
5. Key characteristics that make this response high quality

{format}"#,
        query = query,
        response = response,
        quality_score = quality_score,
        format = PATTERN_EXTRACTION_FORMAT
    )
}

/// Self-critique prompt used on the first refinement round (iteration 2).
pub fn refinement_critique_prompt(
    iteration: usize,
    previous_quality: f64,
    quality_threshold: f64,
    previous_response: &str,
) -> String {
    format!(
        r#"=== REFINEMENT ITERATION {iteration} ===

Previous response quality: {previous_quality:.2} (below threshold of {quality_threshold})

PREVIOUS RESPONSE:
{previous_response}

TASK: Critically analyze the previous response and identify its weaknesses.

Consider:
1. Accuracy: Are there any errors or inaccuracies?
2. Completeness: Is any important information missing?
3. Clarity: Could the explanation be clearer or more concise?
4. Logic: Are the reasoning steps sound and well-connected?

Then provide an improved response that addresses these weaknesses.
"#
    )
}

/// Targeted prompt used on the later refinement rounds.
pub fn refinement_final_prompt(
    iteration: usize,
    previous_quality: f64,
    focus_areas: &[&str],
    previous_response: &str,
) -> String {
    format!(
        r#"=== REFINEMENT ITERATION {iteration} (FINAL) ===

Previous response quality: {previous_quality:.2}

FOCUS AREAS FOR IMPROVEMENT: {focus}

PREVIOUS RESPONSE:
{previous_response}

TASK: Provide your best possible response, specifically focusing on the areas above.

This is the final refinement attempt. Ensure:
- All information is accurate and verified
- The response is complete with no missing elements
- The explanation is crystal clear and well-structured
- All reasoning steps are explicit and logical
"#,
        focus = focus_areas.join(", ")
    )
}

/// Prompt condensing a conversation into cumulative preferences.
pub fn context_synthesis_prompt(history_text: &str) -> String {
    format!(
        r#"Review the following conversation and extract a concise summary of:
1. ALL user preferences mentioned (combine them, don't drop any)
2. ALL constraints or requirements stated
3. The cumulative context built across messages

Conversation:
{history_text}

Provide a brief synthesis (2-4 sentences) that captures the COMBINED preferences and context.
If the user mentions multiple interests (like "healthcare" then "technology"), note they want the intersection of both.
Format: "User is interested in [X and Y and Z]. They prefer [constraints]. Context: [key points]."
"#
    )
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
