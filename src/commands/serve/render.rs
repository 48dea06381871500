use std::fmt::Write as _;

use crate::error::{FormField, ValidationError};
use crate::model::{Progress, SampledItem};
use crate::util::escape_html;
use crate::workflow::ScoreRange;

const STYLE: &str = "
body { font-family: sans-serif; margin: 0; display: flex; }
main { flex: 3; padding: 1.5rem 2rem; max-width: 60rem; }
aside { flex: 1; padding: 1.5rem; background: #f4f4f6; min-height: 100vh; }
.context { white-space: pre-wrap; background: #fafafa; border: 1px solid #ddd; padding: 0.75rem; }
.statement { background: #e8f1fb; padding: 0.75rem; }
.error { color: #a40000; }
.notice { background: #fde8e8; padding: 0.5rem; }
.nav { display: flex; gap: 1rem; }
textarea { width: 100%; }
";

const DEFAULT_SCALE: [(u32, &str, &str); 5] = [
    (1, "No expertise", "vague, anecdotal, emotional"),
    (2, "Minimal expertise", "limited reasoning, lacks technical language"),
    (3, "Moderate expertise", "ambiguous, no clear expert cues"),
    (4, "Strong expertise", "specialized reasoning, accurate"),
    (5, "Very strong expertise", "precise terminology, well-reasoned"),
];

const LIKERT_SCALE: [(u32, &str, &str); 5] = [
    (1, "Strongly Disagree: clearly non-expert", "uninformed, vague, anecdotal, incorrect, or purely emotional"),
    (2, "Disagree: likely non-expert", "limited reasoning, lacks technical or evidential language"),
    (3, "Undecided: ambiguous or generic statement", "no clear expert or non-expert cues"),
    (4, "Agree: likely expert", "some specialized reasoning, accurate and structured"),
    (5, "Strongly Agree: clearly expert", "precise terminology, well-reasoned, supported by evidence"),
];

/// Values shown in the form, either prefilled or echoed back after a
/// rejected submission.
pub(super) struct FormValues<'a> {
    pub(super) rater_id: &'a str,
    pub(super) score: &'a str,
    pub(super) justification: &'a str,
}

pub(super) struct ItemPage<'a> {
    pub(super) item: &'a SampledItem,
    pub(super) index: usize,
    pub(super) total: usize,
    pub(super) progress: Option<&'a Progress>,
    pub(super) score_range: ScoreRange,
    pub(super) values: FormValues<'a>,
    pub(super) errors: Option<&'a ValidationError>,
    pub(super) notice: Option<&'a str>,
}

pub(super) fn item_page(page: &ItemPage<'_>) -> String {
    let mut body = String::new();

    let _ = write!(
        body,
        "<h2>Speech {} of {}</h2>",
        page.index + 1,
        page.total
    );
    if let Some(progress) = page.progress {
        let _ = write!(
            body,
            "<p>Progress: {}/{} speeches annotated</p><progress value=\"{}\" max=\"{}\"></progress>",
            progress.completed, progress.total, progress.completed, progress.total
        );
    }

    if let Some(notice) = page.notice {
        let _ = write!(body, "<p class=\"notice\">{}</p>", escape_html(notice));
    }

    body.push_str("<div class=\"nav\">");
    nav_button(&mut body, "/previous", "Previous", page.index == 0);
    nav_button(&mut body, "/next", "Next", page.index + 1 >= page.total);
    body.push_str("</div><hr>");

    if let Some(topic) = &page.item.topic {
        let _ = write!(body, "<p><strong>Topic:</strong> {}</p>", escape_html(topic));
    }

    body.push_str("<h3>Previous Context</h3>");
    if page.item.context.is_empty() {
        body.push_str("<p><em>No previous context available</em></p>");
    } else {
        let numbered: Vec<String> = page
            .item
            .context
            .iter()
            .enumerate()
            .map(|(i, entry)| format!("{}. {}", i + 1, escape_html(entry)))
            .collect();
        let _ = write!(body, "<div class=\"context\">{}</div>", numbered.join("\n\n"));
    }

    body.push_str("<h3>Statement to Annotate</h3><p class=\"statement\">");
    if let Some(speaker) = &page.item.speaker {
        let _ = write!(body, "<strong>{}:</strong> ", escape_html(speaker));
    }
    body.push_str(&escape_html(&page.item.statement));
    body.push_str("</p><hr>");

    annotation_form(&mut body, page);

    layout("Speech Expertise Annotation", &body, page.score_range)
}

fn annotation_form(body: &mut String, page: &ItemPage<'_>) {
    let range = page.score_range;

    body.push_str("<h3>Your Annotation</h3><form method=\"post\" action=\"/submit\">");

    let _ = write!(
        body,
        "<p><label>Rater ID <input name=\"rater_id\" value=\"{}\"></label>{}</p>",
        escape_html(page.values.rater_id),
        field_error(page.errors, FormField::RaterId)
    );
    let _ = write!(
        body,
        "<p><label>Expertise Score ({min}-{max}) <input type=\"number\" name=\"score\" min=\"{min}\" max=\"{max}\" step=\"1\" value=\"{value}\"></label>{error}</p>",
        min = range.min(),
        max = range.max(),
        value = escape_html(page.values.score),
        error = field_error(page.errors, FormField::Score)
    );
    let _ = write!(
        body,
        "<p><label>Justification<br><textarea name=\"justification\" rows=\"6\" placeholder=\"Explain your rating. What linguistic evidence of expertise (or lack thereof) do you see?\">{}</textarea></label>{}</p>",
        escape_html(page.values.justification),
        field_error(page.errors, FormField::Justification)
    );

    body.push_str("<button type=\"submit\">Submit Annotation</button></form>");
}

fn field_error(errors: Option<&ValidationError>, field: FormField) -> String {
    errors
        .and_then(|errors| errors.message_for(field))
        .map(|message| format!(" <span class=\"error\">{}</span>", escape_html(message)))
        .unwrap_or_default()
}

fn nav_button(body: &mut String, action: &str, label: &str, disabled: bool) {
    let _ = write!(
        body,
        "<form method=\"post\" action=\"{action}\"><button type=\"submit\"{}>{label}</button></form>",
        if disabled { " disabled" } else { "" }
    );
}

pub(super) fn done_page(
    progress: Option<&Progress>,
    location: &str,
    score_range: ScoreRange,
) -> String {
    let mut body = String::from("<h2>You have completed all annotations!</h2>");
    if let Some(progress) = progress {
        let _ = write!(
            body,
            "<p>Progress: {}/{} speeches annotated by <strong>{}</strong></p>",
            progress.completed,
            progress.total,
            escape_html(&progress.rater_id)
        );
    }
    let _ = write!(
        body,
        "<p>All annotations saved to <code>{}</code>. You can now close this browser tab.</p>",
        escape_html(location)
    );
    body.push_str(
        "<form method=\"post\" action=\"/restart\"><button type=\"submit\">Review from the first speech</button></form>",
    );

    layout("Annotation complete", &body, score_range)
}

pub(super) fn instructions_page(score_range: ScoreRange) -> String {
    let mut body = String::from(
        "<h2>Welcome</h2>\
         <p>You are assisting a research study on <strong>deliberative communication</strong>. \
         Your task is to assess how much a given speech act demonstrates <strong>domain expertise</strong> \
         on the topic under discussion.</p>\
         <h3>What is \"Expertise\"?</h3>\
         <p>Expertise here refers to the expression of <strong>specialized knowledge</strong>, \
         <strong>technical accuracy</strong>, and the ability to <strong>reason with evidence or \
         well-informed arguments</strong>, as shown through language use.</p>\
         <h3>Your Task</h3>\
         <p>You will evaluate speaker statements in the context of ongoing deliberations. Refer to the \
         <strong>previous context</strong> to assess how the current speech act signifies expertise \
         in the current discussion topics.</p>\
         <p><em>The input may include minor transcription errors (from speech-to-text).</em></p>\
         <h3>Linguistic Indicators of Expertise</h3><ul>\
         <li><strong>Domain-specific or technical vocabulary</strong> (precision, correct terminology)</li>\
         <li><strong>Structured reasoning and inferential coherence</strong>: cause-effect (because, since, \
         therefore, thus, hence), entailment (it follows that, this implies that), conditional inference \
         (if ... then ..., given that ... we can conclude ...), syllogistic reasoning</li>\
         <li><strong>Evidence or citation markers</strong> (according to, studies show, data suggest)</li>\
         <li><strong>Epistemic calibration</strong> (balanced hedges like may, might, suggests)</li>\
         <li><strong>Syntactic and lexical complexity</strong></li>\
         <li><strong>Analytical focus over personal anecdote or emotion</strong></li>\
         <li><strong>Relevance to current topic</strong></li></ul>\
         <h3>What to Avoid</h3>\
         <p>Do <strong>not</strong> judge based on fluency or confidence of tone, opinion alignment, \
         or personal agreement with the content. Focus on linguistic cues that signal expertise \
         or informed reasoning.</p>",
    );

    body.push_str("<h3>Rating Scale</h3><ul>");
    if score_range == ScoreRange::default() {
        for (score, label, hint) in LIKERT_SCALE {
            let _ = write!(body, "<li><strong>{score}</strong> {label} <em>({hint})</em></li>");
        }
    } else {
        let _ = write!(
            body,
            "<li><strong>{}</strong> clearly non-expert</li><li><strong>{}</strong> clearly expert</li>",
            score_range.min(),
            score_range.max()
        );
    }
    body.push_str(
        "</ul><h3>Justification</h3>\
         <p>For each rating, provide a <strong>one-sentence justification</strong> referencing specific \
         linguistic or reasoning cues.</p>\
         <p><a href=\"/\">I understand, start annotating</a></p>",
    );

    layout("Instructions", &body, score_range)
}

pub(super) fn error_page(message: &str, score_range: ScoreRange) -> String {
    let body = format!(
        "<h2>Something went wrong</h2><p class=\"notice\">{}</p><p><a href=\"/\">Back</a></p>",
        escape_html(message)
    );
    layout("Error", &body, score_range)
}

fn layout(title: &str, main: &str, score_range: ScoreRange) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title><style>{STYLE}</style></head><body><main><h1>Speech Expertise Annotation Tool</h1>{main}</main><aside>{}</aside></body></html>",
        guidelines(score_range)
    )
}

fn guidelines(score_range: ScoreRange) -> String {
    let mut out = String::from("<h3>Expertise Rating Scale</h3><ul>");
    if score_range == ScoreRange::default() {
        for (score, label, hint) in DEFAULT_SCALE {
            let _ = write!(out, "<li><strong>{score}</strong> {label} <em>({hint})</em></li>");
        }
    } else {
        let _ = write!(
            out,
            "<li><strong>{}</strong> lowest expertise</li><li><strong>{}</strong> highest expertise</li>",
            score_range.min(),
            score_range.max()
        );
    }
    out.push_str("</ul><p><a href=\"/instructions\">Show instructions again</a></p>");
    out.push_str(
        "<h3>What to Look For</h3><ul>\
         <li>Domain-specific vocabulary</li>\
         <li>Structured reasoning (because, thus, if...then)</li>\
         <li>Evidence markers (studies show)</li>\
         <li>Epistemic hedges (may, might, suggests)</li>\
         <li>Syntactic complexity</li>\
         <li>Analytical rather than emotional focus</li>\
         <li>Topic relevance</li></ul>\
         <h3>Avoid Judging</h3><ul>\
         <li>Fluency or confidence of tone</li>\
         <li>Opinion alignment</li>\
         <li>Personal agreement</li></ul>",
    );
    out
}
