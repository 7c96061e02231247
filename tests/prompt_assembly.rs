use std::collections::BTreeSet;

use quillpad::{
    prompt::{EMPTY_USER_PAYLOAD, PromptError, PromptInput, Role, assemble},
    types::{FunctionType, SortOrder},
    work::{Archive, ArchiveCategory, Chapter, PromptTemplate, TemplateContent},
};

fn template(body: &str) -> PromptTemplate {
    PromptTemplate {
        id: 1,
        title: "Continue".to_string(),
        content: TemplateContent::classify(1, body),
        function: FunctionType::Writing,
    }
}

fn archive(id: i64, title: &str, content: &str, category: ArchiveCategory) -> Archive {
    Archive {
        id,
        work_id: 7,
        title: title.to_string(),
        content: content.to_string(),
        category,
    }
}

fn chapters() -> Vec<Chapter> {
    vec![
        Chapter::new("Arrival", "The train pulled in."),
        Chapter::new("", "Nobody waited."),
        Chapter::new("Departure", "She left at dawn."),
    ]
}

fn input<'a>(
    template: Option<&'a PromptTemplate>,
    chapters: &'a [Chapter],
    selected: &'a BTreeSet<usize>,
    archives: &'a [&'a Archive],
    sort: SortOrder,
) -> PromptInput<'a> {
    PromptInput {
        template,
        instruction: "",
        chapters,
        selected_chapters: selected,
        archives,
        sort,
        excerpt_limit: 500,
    }
}

#[test]
fn empty_payload_becomes_sentinel() {
    let t = template("Write on.");
    let selected = BTreeSet::new();
    let prompt = assemble(&input(Some(&t), &[], &selected, &[], SortOrder::Ascending)).expect("assemble");

    assert_eq!(prompt.messages.len(), 2);
    assert_eq!(prompt.messages[0].role, Role::System);
    assert_eq!(prompt.messages[1].role, Role::User);
    assert_eq!(prompt.user(), EMPTY_USER_PAYLOAD);
    assert!(prompt.system().ends_with("<prompt>Write on.</prompt>"));
    assert!(prompt.system().contains("<general_rules>"));
    assert!(prompt.system().contains("<general_rules_2>"));
}

#[test]
fn whitespace_instruction_counts_as_empty() {
    let t = template("Write on.");
    let selected = BTreeSet::new();
    let mut pi = input(Some(&t), &[], &selected, &[], SortOrder::Ascending);
    pi.instruction = "  \n ";
    assert_eq!(assemble(&pi).expect("assemble").user(), EMPTY_USER_PAYLOAD);
}

#[test]
fn missing_template_fails_before_assembly() {
    let selected = BTreeSet::from([0]);
    let chapters = chapters();
    let err = assemble(&input(None, &chapters, &selected, &[], SortOrder::Ascending)).expect_err("no template");
    assert_eq!(err, PromptError::NoTemplateSelected);
}

#[test]
fn chapter_order_follows_sort() {
    let t = template("Write on.");
    let chapters = chapters();
    let selected = BTreeSet::from([0, 1, 2]);

    let desc = assemble(&input(Some(&t), &chapters, &selected, &[], SortOrder::Descending)).expect("assemble");
    let asc = assemble(&input(Some(&t), &chapters, &selected, &[], SortOrder::Ascending)).expect("assemble");

    let positions = |text: &str| -> Vec<usize> {
        ["<chapter_1>", "<chapter_2>", "<chapter_3>"]
            .iter()
            .map(|tag| text.find(tag).expect("chapter tag"))
            .collect()
    };
    let d = positions(desc.user());
    assert!(d[2] < d[1] && d[1] < d[0]);
    let a = positions(asc.user());
    assert!(a[0] < a[1] && a[1] < a[2]);

    // untitled chapters get a numbered title
    assert!(asc.user().contains("<chapter_2>Chapter 2\nNobody waited.</chapter_2>"));
}

#[test]
fn out_of_range_selections_are_skipped() {
    let t = template("Write on.");
    let chapters = chapters();
    let selected = BTreeSet::from([1, 9]);
    let prompt = assemble(&input(Some(&t), &chapters, &selected, &[], SortOrder::Ascending)).expect("assemble");

    assert!(prompt.user().contains("<chapter_2>"));
    assert!(!prompt.user().contains("<chapter_10>"));
}

#[test]
fn long_chapters_are_truncated_to_the_excerpt_limit() {
    let t = template("Write on.");
    let body = "字".repeat(501);
    let chapters = vec![Chapter::new("Long", body.clone())];
    let selected = BTreeSet::from([0]);
    let prompt = assemble(&input(Some(&t), &chapters, &selected, &[], SortOrder::Ascending)).expect("assemble");

    let expected = format!("{}...", "字".repeat(500));
    assert!(prompt.user().contains(&format!("<chapter_1>Long\n{expected}</chapter_1>")));

    let exact = vec![Chapter::new("Exact", "字".repeat(500))];
    let prompt = assemble(&input(Some(&t), &exact, &selected, &[], SortOrder::Ascending)).expect("assemble");
    assert!(!prompt.user().contains("..."));
}

#[test]
fn archives_split_into_characters_and_others() {
    let t = template("Write on.");
    let lin = archive(1, "Lin", "A quiet conductor.", ArchiveCategory::Character);
    let city = archive(2, "Harbin", "Cold city.", ArchiveCategory::Other("setting".to_string()));
    let blurb = archive(3, "Blurb", "A night journey.", ArchiveCategory::Introduction);
    let selected = BTreeSet::new();
    let picked = [&city, &lin, &blurb];

    let mut pi = input(Some(&t), &[], &selected, &picked, SortOrder::Ascending);
    pi.instruction = "Continue the scene.";
    let prompt = assemble(&pi).expect("assemble");
    let user = prompt.user();

    assert!(user.starts_with("<user_instruction>Continue the scene.</user_instruction>"));
    assert!(user.contains("<characters>\n<Lin>A quiet conductor.</Lin>\n</characters>"));
    assert!(user.contains("<setting_1>Harbin\nCold city.</setting_1>"));
    assert!(user.contains("<introduction_2>Blurb\nA night journey.</introduction_2>"));
    assert!(!user.contains("<chapters>"));
    assert!(user.find("<characters>") < user.find("<archives>"));
}

#[test]
fn encrypted_templates_travel_as_reference_tokens() {
    let secret = PromptTemplate {
        id: 42,
        title: "Hidden".to_string(),
        content: TemplateContent::classify(42, "U2FsdGVkX1+abc"),
        function: FunctionType::Polishing,
    };
    assert!(secret.content.is_encrypted());

    let selected = BTreeSet::new();
    let prompt = assemble(&input(Some(&secret), &[], &selected, &[], SortOrder::Ascending)).expect("assemble");
    assert!(prompt.system().contains("<prompt>__ENCRYPTED_PROMPT_ID__:42</prompt>"));
    assert!(!prompt.system().contains("U2Fsd"));
}
