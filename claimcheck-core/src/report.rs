//! Claims, evidence, verdicts and the final truthfulness report.
//!
//! The report generator produces a structured [`Report`]; the `final_report`
//! text is always rendered from it by [`Report::render`], so its section
//! layout does not depend on model formatting.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// A factual assertion extracted from the input text. `index` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub index: usize,
    pub text: String,
}

impl Claim {
    /// Build the ordered claim list, dropping blank entries and
    /// case-insensitive duplicates (first occurrence wins).
    pub fn from_texts<I, S>(texts: I) -> Vec<Claim>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = std::collections::HashSet::new();
        let mut claims = Vec::new();

        for text in texts {
            let text = collapse_whitespace(text.as_ref());
            if text.is_empty() || !seen.insert(text.to_lowercase()) {
                continue;
            }
            claims.push(Claim {
                index: claims.len() + 1,
                text,
            });
        }

        claims
    }
}

/// Whether a piece of evidence backs or contradicts its claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    Supporting,
    Opposing,
}

/// One summarized piece of web evidence with its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub stance: Stance,
    pub summary: String,
    pub source: String,
}

/// Web evidence gathered for one claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimEvidence {
    pub claim: String,
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
}

impl ClaimEvidence {
    pub fn with_stance(&self, stance: Stance) -> impl Iterator<Item = &EvidenceItem> {
        self.evidence.iter().filter(move |e| e.stance == stance)
    }
}

/// Verdict for one claim from the fact-check database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactCheckVerdict {
    pub claim: String,
    pub inference: String,
    /// Empty when no published review exists
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,
}

impl FactCheckVerdict {
    pub const NOT_FOUND: &'static str = "No published fact-check found";

    pub fn not_found(claim: impl Into<String>) -> Self {
        Self {
            claim: claim.into(),
            inference: Self::NOT_FOUND.to_string(),
            url: String::new(),
            publisher: None,
            rating: None,
        }
    }

    pub fn has_source(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

/// Likely truthfulness of a claim, or of the text overall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Conclusion {
    True,
    False,
    #[serde(rename = "Partially True")]
    PartiallyTrue,
    Unverified,
}

impl Conclusion {
    pub const ALL: [Conclusion; 4] = [
        Conclusion::True,
        Conclusion::False,
        Conclusion::PartiallyTrue,
        Conclusion::Unverified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::True => "True",
            Self::False => "False",
            Self::PartiallyTrue => "Partially True",
            Self::Unverified => "Unverified",
        }
    }

    pub fn labels() -> Vec<&'static str> {
        Self::ALL.iter().map(Conclusion::as_str).collect()
    }
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the fact-checking section of a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactCheckingResult {
    pub source: String,
    pub url: String,
    pub summary: String,
}

/// Report entry for one claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedClaim {
    pub claim_text: String,
    /// Supporting and opposing evidence as display text, see [`web_search_text`]
    pub web_search_results: String,
    /// The evidence behind `web_search_results`, itemized
    #[serde(default)]
    pub web_evidence: Vec<EvidenceItem>,
    pub fact_checking_results: Vec<FactCheckingResult>,
    pub reliability_analysis: String,
    pub conclusion: Conclusion,
    pub conclusion_reason: String,
}

/// Evidence listed under `Supporting Evidence:` and `Opposing Evidence:`
/// headings, one `- summary (Source: ...)` line per item.
pub fn web_search_text(evidence: &[EvidenceItem]) -> String {
    evidence_lines(evidence).join("\n")
}

fn evidence_lines(evidence: &[EvidenceItem]) -> Vec<String> {
    let mut lines = Vec::new();
    for (stance, heading) in [
        (Stance::Supporting, "Supporting Evidence"),
        (Stance::Opposing, "Opposing Evidence"),
    ] {
        lines.push(format!("{heading}:"));
        let before = lines.len();
        for item in evidence.iter().filter(|e| e.stance == stance) {
            lines.push(format!(
                "  - {} (Source: {})",
                one_line(&item.summary),
                or_unknown(&item.source)
            ));
        }
        if lines.len() == before {
            lines.push("  - None found".to_string());
        }
    }
    lines
}

/// Structured truthfulness report for a whole text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub analyzed_claims: Vec<AnalyzedClaim>,
    /// Overall verdict for the text
    pub tag: Conclusion,
    pub overall_summary: String,
}

impl Report {
    /// Render the `final_report` text.
    ///
    /// Every free-text value is collapsed onto one line, so section headings
    /// only ever appear at the start of the lines written here.
    pub fn render(&self) -> String {
        let mut out = String::new();

        for (i, claim) in self.analyzed_claims.iter().enumerate() {
            out.push_str(&format!("Claim {}: {}\n", i + 1, one_line(&claim.claim_text)));

            out.push_str("Web Search Results:\n");
            for line in evidence_lines(&claim.web_evidence) {
                out.push_str(&format!("  {line}\n"));
            }

            out.push_str("Fact-Checking Database Results:\n");
            if claim.fact_checking_results.is_empty() {
                out.push_str(&format!("  - {}\n", FactCheckVerdict::NOT_FOUND));
            }
            for result in &claim.fact_checking_results {
                let url = one_line(&result.url);
                let url = if url.is_empty() { "n/a".to_string() } else { url };
                out.push_str(&format!(
                    "  - Inference: {} (Source: {}, URL: {})\n",
                    one_line(&result.summary),
                    or_unknown(&result.source),
                    url
                ));
            }

            out.push_str(&format!(
                "Reliability Analysis: {}\n",
                one_line(&claim.reliability_analysis)
            ));
            out.push_str(&format!(
                "Conclusion: {} - {}\n\n",
                claim.conclusion,
                one_line(&claim.conclusion_reason)
            ));
        }

        out.push_str(&format!(
            "Overall Report Summary: {} - {}\n",
            self.tag,
            one_line(&self.overall_summary)
        ));
        out
    }
}

/// Number of times each section heading starts a line of a rendered report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionCounts {
    pub claims: usize,
    pub web_search: usize,
    pub fact_checking: usize,
    pub reliability: usize,
    pub conclusions: usize,
    pub overall_summary: usize,
}

impl SectionCounts {
    pub fn of(text: &str) -> Self {
        let mut counts = Self::default();
        for line in text.lines() {
            if is_claim_heading(line) {
                counts.claims += 1;
            } else if line.starts_with("Web Search Results:") {
                counts.web_search += 1;
            } else if line.starts_with("Fact-Checking Database Results:") {
                counts.fact_checking += 1;
            } else if line.starts_with("Reliability Analysis:") {
                counts.reliability += 1;
            } else if let Some(rest) = line.strip_prefix("Conclusion: ") {
                if Conclusion::ALL.iter().any(|c| rest.starts_with(c.as_str())) {
                    counts.conclusions += 1;
                }
            } else if line.starts_with("Overall Report Summary:") {
                counts.overall_summary += 1;
            }
        }
        counts
    }
}

/// Check a rendered report has one complete section block per claim and a
/// single closing summary line.
pub fn check_report_shape(text: &str, claim_count: usize) -> Result<()> {
    let counts = SectionCounts::of(text);
    let per_claim = [
        ("Claim", counts.claims),
        ("Web Search Results", counts.web_search),
        ("Fact-Checking Database Results", counts.fact_checking),
        ("Reliability Analysis", counts.reliability),
        ("Conclusion", counts.conclusions),
    ];

    for (section, n) in per_claim {
        if n != claim_count {
            return Err(Error::Internal(format!(
                "report has {n} '{section}' sections for {claim_count} claims"
            )));
        }
    }
    if counts.overall_summary != 1 {
        return Err(Error::Internal(format!(
            "report has {} overall summary lines",
            counts.overall_summary
        )));
    }
    let last = text.lines().rev().find(|l| !l.trim().is_empty());
    if !last.is_some_and(|l| l.starts_with("Overall Report Summary:")) {
        return Err(Error::Internal(
            "overall summary is not the last line of the report".to_string(),
        ));
    }
    Ok(())
}

fn is_claim_heading(line: &str) -> bool {
    line.strip_prefix("Claim ")
        .and_then(|rest| rest.split_once(':'))
        .is_some_and(|(n, _)| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn one_line(s: &str) -> String {
    collapse_whitespace(s)
}

fn or_unknown(source: &str) -> String {
    let source = one_line(source);
    if source.is_empty() {
        "unknown".to_string()
    } else {
        source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn sample_claim() -> AnalyzedClaim {
        let web_evidence = vec![EvidenceItem {
            stance: Stance::Opposing,
            summary: "Astronauts report it cannot be seen with the naked eye".into(),
            source: "https://www.nasa.gov/great-wall".into(),
        }];
        AnalyzedClaim {
            claim_text: "The Great Wall of China is visible from space".into(),
            web_search_results: web_search_text(&web_evidence),
            web_evidence,
            fact_checking_results: vec![FactCheckingResult {
                source: "Snopes".into(),
                url: "https://www.snopes.com/great-wall".into(),
                summary: "False".into(),
            }],
            reliability_analysis: "NASA and Snopes are reputable sources".into(),
            conclusion: Conclusion::False,
            conclusion_reason: "Multiple reliable sources refute it".into(),
        }
    }

    #[test]
    fn test_claims_from_texts_trims_and_dedups() {
        let claims = Claim::from_texts([
            "  Water boils at 100C at sea level ",
            "",
            "water boils at  100c at sea level",
            "The moon orbits Earth",
            "   ",
        ]);

        assert_eq!(
            claims,
            vec![
                Claim {
                    index: 1,
                    text: "Water boils at 100C at sea level".into()
                },
                Claim {
                    index: 2,
                    text: "The moon orbits Earth".into()
                },
            ]
        );
    }

    #[test]
    fn test_conclusion_serde_labels() {
        assert_eq!(
            serde_json::to_string(&Conclusion::PartiallyTrue).unwrap(),
            "\"Partially True\""
        );
        let parsed: Conclusion = serde_json::from_str("\"Unverified\"").unwrap();
        assert_eq!(parsed, Conclusion::Unverified);
        assert_eq!(
            Conclusion::labels(),
            vec!["True", "False", "Partially True", "Unverified"]
        );
    }

    #[test]
    fn test_web_search_results_serialize_as_text() {
        let value = serde_json::to_value(sample_claim()).unwrap();

        assert_eq!(
            value["web_search_results"],
            "Supporting Evidence:\n  - None found\nOpposing Evidence:\n  \
             - Astronauts report it cannot be seen with the naked eye \
             (Source: https://www.nasa.gov/great-wall)"
        );
        assert_eq!(value["web_evidence"][0]["stance"], "opposing");
        assert!(value["fact_checking_results"].is_array());

        let back: AnalyzedClaim = serde_json::from_value(value).unwrap();
        assert_eq!(back, sample_claim());
    }

    #[test]
    fn test_render_single_claim() {
        let report = Report {
            analyzed_claims: vec![sample_claim()],
            tag: Conclusion::False,
            overall_summary: "The article repeats a popular myth.".into(),
        };

        let expected = "\
Claim 1: The Great Wall of China is visible from space
Web Search Results:
  Supporting Evidence:
    - None found
  Opposing Evidence:
    - Astronauts report it cannot be seen with the naked eye (Source: https://www.nasa.gov/great-wall)
Fact-Checking Database Results:
  - Inference: False (Source: Snopes, URL: https://www.snopes.com/great-wall)
Reliability Analysis: NASA and Snopes are reputable sources
Conclusion: False - Multiple reliable sources refute it

Overall Report Summary: False - The article repeats a popular myth.
";
        assert_eq!(report.render(), expected);
        check_report_shape(expected, 1).unwrap();
    }

    #[test]
    fn test_render_without_claims_has_only_summary() {
        let report = Report {
            analyzed_claims: Vec::new(),
            tag: Conclusion::Unverified,
            overall_summary: "No factual claims were found.".into(),
        };
        let text = report.render();

        assert_eq!(
            text,
            "Overall Report Summary: Unverified - No factual claims were found.\n"
        );
        check_report_shape(&text, 0).unwrap();
    }

    #[test]
    fn test_render_missing_fact_checks_and_sources() {
        let mut claim = sample_claim();
        claim.fact_checking_results.clear();
        claim.web_evidence[0].source = "  ".into();
        let report = Report {
            analyzed_claims: vec![claim],
            tag: Conclusion::Unverified,
            overall_summary: String::new(),
        };
        let text = report.render();

        assert!(text.contains("  - No published fact-check found\n"));
        assert!(text.contains("(Source: unknown)"));
    }

    #[test]
    fn test_check_report_shape_rejects_mismatch() {
        let text = "Claim 1: x\nWeb Search Results:\nOverall Report Summary: True - ok\n";
        let err = check_report_shape(text, 1).unwrap_err();
        assert!(err.to_string().contains("Fact-Checking Database Results"));

        let trailing = "Overall Report Summary: True - ok\nClaim 1: late\n";
        assert!(check_report_shape(trailing, 0).is_err());
    }

    #[test]
    fn test_section_counts_ignore_headings_inside_lines() {
        let text = "  Conclusion: True\nClaim one: not a heading\nClaim 12: heading\n";
        let counts = SectionCounts::of(text);
        assert_eq!(counts.conclusions, 0);
        assert_eq!(counts.claims, 1);
    }

    fn conclusion() -> impl Strategy<Value = Conclusion> {
        prop_oneof![
            Just(Conclusion::True),
            Just(Conclusion::False),
            Just(Conclusion::PartiallyTrue),
            Just(Conclusion::Unverified),
        ]
    }

    // free text that tries to smuggle in section headings
    fn hostile_text() -> impl Strategy<Value = String> {
        prop_oneof![
            ".{0,40}",
            Just("\nClaim 2: injected\nConclusion: True".to_string()),
            Just("line one\nOverall Report Summary: fake".to_string()),
            Just("\nWeb Search Results:\nFact-Checking Database Results:\n".to_string()),
        ]
    }

    fn analyzed_claim() -> impl Strategy<Value = AnalyzedClaim> {
        (
            hostile_text(),
            proptest::collection::vec((any::<bool>(), hostile_text(), hostile_text()), 0..4),
            proptest::collection::vec((hostile_text(), hostile_text(), hostile_text()), 0..3),
            hostile_text(),
            conclusion(),
            hostile_text(),
        )
            .prop_map(|(claim_text, evidence, checks, analysis, conclusion, reason)| {
                let web_evidence: Vec<EvidenceItem> = evidence
                    .into_iter()
                    .map(|(supporting, summary, source)| EvidenceItem {
                        stance: if supporting {
                            Stance::Supporting
                        } else {
                            Stance::Opposing
                        },
                        summary,
                        source,
                    })
                    .collect();
                AnalyzedClaim {
                    claim_text,
                    web_search_results: web_search_text(&web_evidence),
                    web_evidence,
                    fact_checking_results: checks
                        .into_iter()
                        .map(|(source, url, summary)| FactCheckingResult {
                            source,
                            url,
                            summary,
                        })
                        .collect(),
                    reliability_analysis: analysis,
                    conclusion,
                    conclusion_reason: reason,
                }
            })
    }

    proptest! {
        /// A one-claim report has exactly one of each claim section and ends
        /// with a single overall summary, whatever the model wrote.
        #[test]
        fn one_claim_report_has_one_of_each_section(
            claim in analyzed_claim(),
            tag in conclusion(),
            summary in hostile_text(),
        ) {
            let report = Report { analyzed_claims: vec![claim], tag, overall_summary: summary };
            let text = report.render();
            let counts = SectionCounts::of(&text);

            prop_assert_eq!(counts, SectionCounts {
                claims: 1,
                web_search: 1,
                fact_checking: 1,
                reliability: 1,
                conclusions: 1,
                overall_summary: 1,
            });
            prop_assert!(check_report_shape(&text, 1).is_ok());
        }

        /// The same holds per claim for longer reports.
        #[test]
        fn report_sections_scale_with_claims(
            claims in proptest::collection::vec(analyzed_claim(), 0..5),
            tag in conclusion(),
        ) {
            let n = claims.len();
            let report = Report { analyzed_claims: claims, tag, overall_summary: "summary".into() };
            prop_assert!(check_report_shape(&report.render(), n).is_ok());
        }
    }
}
