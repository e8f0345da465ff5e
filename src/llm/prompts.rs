// prompts.rs

/// Prompt for the refine call: group a batch of articles into named
/// story clusters.
pub fn refine_prompt(articles_json: &str) -> String {
    format!(
        "{} | The JSON above is a list of news articles. Group the articles that describe the
same real-world event into story clusters. Only group articles that are clearly about the same
event; leave unrelated articles out entirely. Every cluster needs at least two articles.

Answer with a JSON array only, no prose, in this exact shape:
[{{\"clusterTitle\": \"short neutral headline\", \"articleIds\": [\"id\", \"id\"]}}]

Use only article ids that appear in the input. Do not invent ids and do not explain your answer.",
        articles_json
    )
}

/// Prompt for the cluster summarization call.
pub fn summary_prompt(articles_json: &str) -> String {
    format!(
        "{} | The JSON above lists the articles in one news story cluster. Write a neutral
two to three sentence summary of the story in American English, covering what happened, where,
and what is disputed or still unknown. Do not mention the articles themselves, do not tell me
what you are doing, and do not use markdown.",
        articles_json
    )
}

/// Prompt for the severity assessment call.
pub fn severity_prompt(title: &str, member_titles_json: &str) -> String {
    format!(
        "Story cluster: {} | Member headlines: {} | Assess how severe this news story is on a
0-5 scale: 5 War/Conflict, 4 Mass Casualty/Deaths, 3 National Politics, 2 Economy/Markets,
1 Tech/Business, 0 Other.

Answer with a JSON object only, no prose:
{{\"level\": 0, \"label\": \"Other\", \"reasons\": [\"short reason\"]}}",
        title, member_titles_json
    )
}

/// Prompt for the semantic merge call: find clusters that describe the
/// same event despite different wording.
pub fn semantic_merge_prompt(briefs_json: &str) -> String {
    format!(
        "{} | The JSON above lists story clusters with their index, title, and sample
headlines. Identify groups of clusters that describe the same real-world event. Only group
clusters you are confident about; most clusters belong to no group.

Answer with a JSON array only, no prose:
[{{\"title\": \"merged headline\", \"indices\": [0, 3]}}]

Each group needs at least two indices. Use only indices that appear in the input.",
        briefs_json
    )
}
