use furigana_annotator_rust::analyze::render_analysis_prompt;

#[test]
fn analysis_prompt_snapshot() {
    let prompt = render_analysis_prompt("日本語を勉強しています。").unwrap();
    insta::assert_snapshot!("analysis_prompt", prompt);
}
