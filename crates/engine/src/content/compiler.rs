use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use roxmltree::{Document, Node};
use tracing::info;

use crate::challenge::{
    AttackSchedule, Command, CommandId, SubsystemId, DEFAULT_MAX_CORRUPTION, DEFAULT_REWARD_MS, DEFAULT_THRESHOLD_MS,
};

use super::database::{ChallengeDef, LessonDatabase, RepairSceneDef, RepairSlotDef};
use super::discovery::collect_xml_files_sorted;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorCode {
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownDefType,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateDef,
    UnresolvedReference,
}

#[derive(Debug, Clone)]
pub struct ContentCompileError {
    pub code: ContentErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ContentCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for ContentCompileError {}

#[derive(Debug, Clone)]
struct Located<T> {
    def: T,
    file_path: PathBuf,
    location: SourceLocation,
}

impl<T> Located<T> {
    fn error(&self, code: ContentErrorCode, message: String) -> ContentCompileError {
        ContentCompileError {
            code,
            message,
            file_path: self.file_path.clone(),
            location: Some(self.location),
        }
    }
}

#[derive(Debug, Default)]
struct PendingDefs {
    commands: Vec<Located<Command>>,
    challenges: Vec<Located<ChallengeDef>>,
    repair_scenes: Vec<Located<RepairSceneDef>>,
}

pub fn compile_lesson_database(lessons_dir: &Path) -> Result<LessonDatabase, ContentCompileError> {
    let xml_files = collect_xml_files_sorted(lessons_dir)
        .map_err(|error| read_error(error.path, error.source))?;

    let mut pending = PendingDefs::default();
    for xml_file in &xml_files {
        let raw = fs::read_to_string(xml_file)
            .map_err(|source| read_error(xml_file.clone(), source))?;
        parse_defs_document(xml_file, &raw, &mut pending)?;
    }

    let database = link_defs(pending)?;
    info!(
        lessons_dir = %lessons_dir.display(),
        xml_files = xml_files.len(),
        commands = database.command_count(),
        challenges = database.challenge_names().count(),
        repair_scenes = database.repair_scene_names().count(),
        "lesson_content_compiled"
    );
    Ok(database)
}

/// Compiles a single in-memory document. `file_path` is only used for
/// error reporting.
pub fn compile_lesson_source(
    file_path: &Path,
    raw: &str,
) -> Result<LessonDatabase, ContentCompileError> {
    let mut pending = PendingDefs::default();
    parse_defs_document(file_path, raw, &mut pending)?;
    link_defs(pending)
}

struct DocContext<'a, 'input> {
    file_path: &'a Path,
    doc: &'a Document<'input>,
}

impl<'a, 'input> DocContext<'a, 'input> {
    fn location(&self, node: Node<'_, '_>) -> SourceLocation {
        let pos = self.doc.text_pos_at(node.range().start);
        SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }
    }

    fn located<T>(&self, def: T, node: Node<'_, '_>) -> Located<T> {
        Located {
            def,
            file_path: self.file_path.to_path_buf(),
            location: self.location(node),
        }
    }

    fn error_at(
        &self,
        code: ContentErrorCode,
        message: String,
        node: Node<'_, '_>,
    ) -> ContentCompileError {
        ContentCompileError {
            code,
            message,
            file_path: self.file_path.to_path_buf(),
            location: Some(self.location(node)),
        }
    }

    fn fields<'n>(
        &self,
        node: Node<'n, 'input>,
        owner: &str,
    ) -> Result<Vec<Node<'n, 'input>>, ContentCompileError> {
        let mut seen = HashSet::<&str>::new();
        let mut fields = Vec::new();
        for field in node.children().filter(|child| child.is_element()) {
            let name = field.tag_name().name();
            if !seen.insert(name) {
                return Err(self.error_at(
                    ContentErrorCode::DuplicateField,
                    format!("duplicate field <{name}> in <{owner}>"),
                    field,
                ));
            }
            fields.push(field);
        }
        Ok(fields)
    }

    fn unknown_field(&self, field: Node<'_, '_>, owner: &str) -> ContentCompileError {
        self.error_at(
            ContentErrorCode::UnknownField,
            format!("unknown field <{}> in <{owner}>", field.tag_name().name()),
            field,
        )
    }

    fn require<T>(
        &self,
        value: Option<T>,
        field_name: &str,
        owner: &str,
        node: Node<'_, '_>,
    ) -> Result<T, ContentCompileError> {
        value.ok_or_else(|| {
            self.error_at(
                ContentErrorCode::MissingField,
                format!("missing required field <{field_name}> in <{owner}>"),
                node,
            )
        })
    }

    fn required_text(
        &self,
        node: Node<'_, '_>,
        field_name: &str,
    ) -> Result<String, ContentCompileError> {
        let value = node.text().map(str::trim).unwrap_or_default().to_string();
        if value.is_empty() {
            return Err(self.error_at(
                ContentErrorCode::MissingField,
                format!("field <{field_name}> must not be empty"),
                node,
            ));
        }
        Ok(value)
    }

    fn parse_number<T: FromStr>(
        &self,
        node: Node<'_, '_>,
        field_name: &str,
    ) -> Result<T, ContentCompileError> {
        let value = self.required_text(node, field_name)?;
        value.parse::<T>().map_err(|_| {
            self.error_at(
                ContentErrorCode::InvalidValue,
                format!("{field_name} '{value}' is not a valid non-negative integer"),
                node,
            )
        })
    }

    fn parse_positive<T: FromStr + PartialEq + Default>(
        &self,
        node: Node<'_, '_>,
        field_name: &str,
    ) -> Result<T, ContentCompileError> {
        let parsed = self.parse_number::<T>(node, field_name)?;
        if parsed == T::default() {
            return Err(self.error_at(
                ContentErrorCode::InvalidValue,
                format!("{field_name} must be greater than 0"),
                node,
            ));
        }
        Ok(parsed)
    }

    fn parse_bool(&self, node: Node<'_, '_>, field_name: &str) -> Result<bool, ContentCompileError> {
        let value = self.required_text(node, field_name)?;
        match value.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(self.error_at(
                ContentErrorCode::InvalidValue,
                format!("invalid {field_name} '{value}'; allowed values: true, false"),
                node,
            )),
        }
    }

    fn list_items<'n>(
        &self,
        node: Node<'n, 'input>,
        field_name: &str,
    ) -> Result<Vec<Node<'n, 'input>>, ContentCompileError> {
        let mut items = Vec::new();
        for child in node.children().filter(|child| child.is_element()) {
            if child.tag_name().name() != "li" {
                return Err(self.error_at(
                    ContentErrorCode::UnknownField,
                    format!(
                        "<{field_name}> may only contain <li> entries, found <{}>",
                        child.tag_name().name()
                    ),
                    child,
                ));
            }
            items.push(child);
        }
        if items.is_empty() {
            return Err(self.error_at(
                ContentErrorCode::MissingField,
                format!("<{field_name}> must list at least one <li>"),
                node,
            ));
        }
        Ok(items)
    }

    fn id_list(
        &self,
        node: Node<'_, '_>,
        field_name: &str,
    ) -> Result<Vec<CommandId>, ContentCompileError> {
        self.list_items(node, field_name)?
            .into_iter()
            .map(|item| self.required_text(item, "li").map(CommandId::new))
            .collect()
    }
}

fn parse_defs_document(
    file_path: &Path,
    raw: &str,
    pending: &mut PendingDefs,
) -> Result<(), ContentCompileError> {
    let doc = Document::parse(raw).map_err(|error| ContentCompileError {
        code: ContentErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;
    let ctx = DocContext {
        file_path,
        doc: &doc,
    };

    let root = doc.root_element();
    if root.tag_name().name() != "Defs" {
        return Err(ctx.error_at(
            ContentErrorCode::InvalidRoot,
            "root element must be <Defs>".to_string(),
            root,
        ));
    }

    for child in root.children().filter(|node| node.is_element()) {
        match child.tag_name().name() {
            "CommandDef" => {
                let def = parse_command_def(&ctx, child)?;
                pending.commands.push(ctx.located(def, child));
            }
            "ChallengeDef" => {
                let def = parse_challenge_def(&ctx, child)?;
                pending.challenges.push(ctx.located(def, child));
            }
            "RepairSceneDef" => {
                let def = parse_repair_scene_def(&ctx, child)?;
                pending.repair_scenes.push(ctx.located(def, child));
            }
            other => {
                return Err(ctx.error_at(
                    ContentErrorCode::UnknownDefType,
                    format!(
                        "unsupported def type <{other}>; expected <CommandDef>, <ChallengeDef> or <RepairSceneDef>"
                    ),
                    child,
                ))
            }
        }
    }
    Ok(())
}

fn parse_command_def(ctx: &DocContext<'_, '_>, node: Node<'_, '_>) -> Result<Command, ContentCompileError> {
    const OWNER: &str = "CommandDef";
    let mut def_name: Option<String> = None;
    let mut text: Option<String> = None;
    let mut category: Option<String> = None;
    let mut decoy: Option<bool> = None;

    for field in ctx.fields(node, OWNER)? {
        match field.tag_name().name() {
            "defName" => def_name = Some(ctx.required_text(field, "defName")?),
            "text" => text = Some(ctx.required_text(field, "text")?),
            "category" => category = Some(ctx.required_text(field, "category")?),
            "decoy" => decoy = Some(ctx.parse_bool(field, "decoy")?),
            _ => return Err(ctx.unknown_field(field, OWNER)),
        }
    }

    let id = CommandId::new(ctx.require(def_name, "defName", OWNER, node)?);
    let text = ctx.require(text, "text", OWNER, node)?;
    let command = if decoy.unwrap_or(false) {
        Command::decoy(id, text)
    } else {
        Command::new(id, text)
    };
    Ok(match category {
        Some(category) => command.with_category(category),
        None => command,
    })
}

fn parse_challenge_def(
    ctx: &DocContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<ChallengeDef, ContentCompileError> {
    const OWNER: &str = "ChallengeDef";
    let mut def_name: Option<String> = None;
    let mut label: Option<String> = None;
    let mut program: Option<Vec<CommandId>> = None;
    let mut decoys: Option<Vec<CommandId>> = None;
    let mut threshold_ms: Option<u64> = None;
    let mut reward_ms: Option<u64> = None;
    let mut max_corruption: Option<u32> = None;
    let mut attack_interval_ms: Option<u64> = None;
    let mut attack_damage: Option<u32> = None;

    for field in ctx.fields(node, OWNER)? {
        match field.tag_name().name() {
            "defName" => def_name = Some(ctx.required_text(field, "defName")?),
            "label" => label = Some(ctx.required_text(field, "label")?),
            "program" => program = Some(ctx.id_list(field, "program")?),
            "decoys" => decoys = Some(ctx.id_list(field, "decoys")?),
            "thresholdMs" => threshold_ms = Some(ctx.parse_positive(field, "thresholdMs")?),
            "rewardMs" => reward_ms = Some(ctx.parse_number(field, "rewardMs")?),
            "maxCorruption" => max_corruption = Some(ctx.parse_positive(field, "maxCorruption")?),
            "attackIntervalMs" => {
                attack_interval_ms = Some(ctx.parse_positive(field, "attackIntervalMs")?)
            }
            "attackDamage" => attack_damage = Some(ctx.parse_number(field, "attackDamage")?),
            _ => return Err(ctx.unknown_field(field, OWNER)),
        }
    }

    let attack = match (attack_interval_ms, attack_damage) {
        (Some(interval_ms), Some(damage)) => Some(AttackSchedule {
            interval_ms,
            damage,
        }),
        (None, None) => None,
        (Some(_), None) => {
            return Err(ctx.error_at(
                ContentErrorCode::MissingField,
                "<attackIntervalMs> requires <attackDamage> in <ChallengeDef>".to_string(),
                node,
            ))
        }
        (None, Some(_)) => {
            return Err(ctx.error_at(
                ContentErrorCode::MissingField,
                "<attackDamage> requires <attackIntervalMs> in <ChallengeDef>".to_string(),
                node,
            ))
        }
    };

    Ok(ChallengeDef {
        def_name: ctx.require(def_name, "defName", OWNER, node)?,
        label: ctx.require(label, "label", OWNER, node)?,
        program: ctx.require(program, "program", OWNER, node)?,
        decoys: decoys.unwrap_or_default(),
        threshold_ms: threshold_ms.unwrap_or(DEFAULT_THRESHOLD_MS),
        reward_ms: reward_ms.unwrap_or(DEFAULT_REWARD_MS),
        max_corruption: max_corruption.unwrap_or(DEFAULT_MAX_CORRUPTION),
        attack,
    })
}

fn parse_repair_scene_def(
    ctx: &DocContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<RepairSceneDef, ContentCompileError> {
    const OWNER: &str = "RepairSceneDef";
    let mut def_name: Option<String> = None;
    let mut label: Option<String> = None;
    let mut subsystems: Option<Vec<RepairSlotDef>> = None;

    for field in ctx.fields(node, OWNER)? {
        match field.tag_name().name() {
            "defName" => def_name = Some(ctx.required_text(field, "defName")?),
            "label" => label = Some(ctx.required_text(field, "label")?),
            "subsystems" => subsystems = Some(parse_repair_slots(ctx, field)?),
            _ => return Err(ctx.unknown_field(field, OWNER)),
        }
    }

    Ok(RepairSceneDef {
        def_name: ctx.require(def_name, "defName", OWNER, node)?,
        label: ctx.require(label, "label", OWNER, node)?,
        subsystems: ctx.require(subsystems, "subsystems", OWNER, node)?,
    })
}

fn parse_repair_slots(
    ctx: &DocContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<Vec<RepairSlotDef>, ContentCompileError> {
    const OWNER: &str = "subsystems/li";
    let mut slots = Vec::new();
    let mut seen_ids = HashSet::<SubsystemId>::new();

    for item in ctx.list_items(node, "subsystems")? {
        let mut id: Option<String> = None;
        let mut challenge: Option<String> = None;
        for field in ctx.fields(item, OWNER)? {
            match field.tag_name().name() {
                "id" => id = Some(ctx.required_text(field, "id")?),
                "challenge" => challenge = Some(ctx.required_text(field, "challenge")?),
                _ => return Err(ctx.unknown_field(field, OWNER)),
            }
        }
        let subsystem_id = SubsystemId::new(ctx.require(id, "id", OWNER, item)?);
        if !seen_ids.insert(subsystem_id.clone()) {
            return Err(ctx.error_at(
                ContentErrorCode::InvalidValue,
                format!("duplicate subsystem id '{subsystem_id}' in <subsystems>"),
                item,
            ));
        }
        slots.push(RepairSlotDef {
            subsystem_id,
            challenge: ctx.require(challenge, "challenge", OWNER, item)?,
        });
    }
    Ok(slots)
}

fn link_defs(pending: PendingDefs) -> Result<LessonDatabase, ContentCompileError> {
    let mut commands = BTreeMap::<CommandId, Command>::new();
    for located in pending.commands {
        if commands.contains_key(&located.def.id) {
            return Err(located.error(
                ContentErrorCode::DuplicateDef,
                format!("duplicate CommandDef '{}'", located.def.id),
            ));
        }
        commands.insert(located.def.id.clone(), located.def);
    }

    let mut challenges = BTreeMap::<String, ChallengeDef>::new();
    for located in pending.challenges {
        let def = &located.def;
        if challenges.contains_key(&def.def_name) {
            return Err(located.error(
                ContentErrorCode::DuplicateDef,
                format!("duplicate ChallengeDef '{}'", def.def_name),
            ));
        }
        for (step_index, id) in def.program.iter().enumerate() {
            match commands.get(id) {
                None => {
                    return Err(located.error(
                        ContentErrorCode::UnresolvedReference,
                        format!(
                            "ChallengeDef '{}' program step {step_index} references unknown command '{id}'",
                            def.def_name
                        ),
                    ))
                }
                Some(command) if command.is_decoy => {
                    return Err(located.error(
                        ContentErrorCode::InvalidValue,
                        format!(
                            "ChallengeDef '{}' program step {step_index} uses decoy command '{id}'",
                            def.def_name
                        ),
                    ))
                }
                Some(_) => {}
            }
        }
        if let Some(id) = def.decoys.iter().find(|id| !commands.contains_key(*id)) {
            return Err(located.error(
                ContentErrorCode::UnresolvedReference,
                format!(
                    "ChallengeDef '{}' decoys reference unknown command '{id}'",
                    def.def_name
                ),
            ));
        }
        challenges.insert(located.def.def_name.clone(), located.def);
    }

    let mut repair_scenes = BTreeMap::<String, RepairSceneDef>::new();
    for located in pending.repair_scenes {
        let def = &located.def;
        if repair_scenes.contains_key(&def.def_name) {
            return Err(located.error(
                ContentErrorCode::DuplicateDef,
                format!("duplicate RepairSceneDef '{}'", def.def_name),
            ));
        }
        if let Some(slot) = def
            .subsystems
            .iter()
            .find(|slot| !challenges.contains_key(&slot.challenge))
        {
            return Err(located.error(
                ContentErrorCode::UnresolvedReference,
                format!(
                    "RepairSceneDef '{}' subsystem '{}' references unknown challenge '{}'",
                    def.def_name, slot.subsystem_id, slot.challenge
                ),
            ));
        }
        repair_scenes.insert(located.def.def_name.clone(), located.def);
    }

    Ok(LessonDatabase::from_defs(commands, challenges, repair_scenes))
}

fn read_error(path: PathBuf, source: std::io::Error) -> ContentCompileError {
    ContentCompileError {
        code: ContentErrorCode::ReadFile,
        message: format!("failed to read lesson content: {source}"),
        file_path: path,
        location: None,
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::challenge::DEFAULT_COMMAND_CATEGORY;

    const COMMANDS_XML: &str = r#"<Defs>
        <CommandDef><defName>blink.pin_mode</defName><text>pinMode(13, OUTPUT);</text><category>setup</category></CommandDef>
        <CommandDef><defName>blink.led_on</defName><text>digitalWrite(13, HIGH);</text></CommandDef>
        <CommandDef><defName>blink.wait</defName><text>delay(1000);</text></CommandDef>
        <CommandDef><defName>blink.led_off</defName><text>digitalWrite(13, LOW);</text></CommandDef>
        <CommandDef><defName>noise.analog</defName><text>analogRead(A0);</text><decoy>true</decoy></CommandDef>
        <CommandDef><defName>noise.serial</defName><text>Serial.begin(9600);</text><decoy>true</decoy></CommandDef>
    </Defs>"#;

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, content).expect("write");
    }

    fn compile_str(raw: &str) -> Result<LessonDatabase, ContentCompileError> {
        compile_lesson_source(Path::new("inline.xml"), raw)
    }

    fn with_commands(body: &str) -> String {
        let commands = COMMANDS_XML
            .trim_start_matches("<Defs>")
            .trim_end_matches("</Defs>");
        format!("<Defs>{commands}{body}</Defs>")
    }

    #[test]
    fn multi_file_compile_resolves_references_across_files() {
        let temp = TempDir::new().expect("temp");
        write_file(&temp.path().join("00_commands.xml"), COMMANDS_XML);
        write_file(
            &temp.path().join("lessons").join("blink.xml"),
            r#"<Defs>
                <ChallengeDef>
                    <defName>lesson.blink</defName>
                    <label>Blink</label>
                    <program><li>blink.pin_mode</li><li>blink.led_on</li><li>blink.wait</li><li>blink.led_off</li><li>blink.wait</li></program>
                    <decoys><li>noise.analog</li><li>noise.serial</li></decoys>
                    <thresholdMs>45000</thresholdMs>
                    <rewardMs>4000</rewardMs>
                    <maxCorruption>80</maxCorruption>
                    <attackIntervalMs>10000</attackIntervalMs>
                    <attackDamage>8</attackDamage>
                </ChallengeDef>
            </Defs>"#,
        );

        let db = compile_lesson_database(temp.path()).expect("compile");
        assert_eq!(db.command_count(), 6);
        let def = db.challenge("lesson.blink").expect("challenge");
        assert_eq!(def.program.len(), 5);
        assert_eq!(
            def.attack,
            Some(AttackSchedule {
                interval_ms: 10_000,
                damage: 8
            })
        );

        let config = db.challenge_config("lesson.blink", 77).expect("config");
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.steps.len(), 5);
        assert_eq!(config.command_pool.len(), 6);
        assert_eq!(config.threshold_ms, 45_000);
        assert_eq!(config.reward_ms, 4_000);
        assert_eq!(config.max_corruption, 80);
        assert_eq!(config.seed, 77);
        assert_eq!(config.name, "lesson.blink");
        assert_eq!(
            db.command(&CommandId::from("blink.pin_mode"))
                .expect("pin mode")
                .category,
            "setup"
        );
        let led_on = db.command(&CommandId::from("blink.led_on")).expect("led on");
        assert_eq!(led_on.category, DEFAULT_COMMAND_CATEGORY);
        assert!(!led_on.is_decoy);
    }

    #[test]
    fn tuning_fields_default_when_absent() {
        let db = compile_str(&with_commands(
            r#"<ChallengeDef><defName>c</defName><label>C</label><program><li>blink.led_on</li></program></ChallengeDef>"#,
        ))
        .expect("compile");
        let def = db.challenge("c").expect("c");
        assert_eq!(def.threshold_ms, DEFAULT_THRESHOLD_MS);
        assert_eq!(def.reward_ms, DEFAULT_REWARD_MS);
        assert_eq!(def.max_corruption, DEFAULT_MAX_CORRUPTION);
        assert!(def.decoys.is_empty());
        assert_eq!(def.attack, None);
    }

    #[test]
    fn missing_def_name_reports_file_and_location() {
        let temp = TempDir::new().expect("temp");
        write_file(
            &temp.path().join("defs.xml"),
            "<Defs>\n  <CommandDef><text>x</text></CommandDef>\n</Defs>",
        );
        let err = compile_lesson_database(temp.path()).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::MissingField);
        assert!(err.file_path.ends_with("defs.xml"));
        assert_eq!(err.location.expect("location").line, 2);
    }

    #[test]
    fn unknown_and_duplicate_fields_error() {
        let err = compile_str(
            "<Defs><CommandDef><defName>a</defName><text>x</text><color>red</color></CommandDef></Defs>",
        )
        .expect_err("unknown");
        assert_eq!(err.code, ContentErrorCode::UnknownField);

        let err = compile_str(
            "<Defs><CommandDef><defName>a</defName><text>x</text><text>y</text></CommandDef></Defs>",
        )
        .expect_err("duplicate");
        assert_eq!(err.code, ContentErrorCode::DuplicateField);
    }

    #[test]
    fn malformed_xml_and_bad_root_error() {
        let err = compile_str("<Defs><CommandDef></Defs>").expect_err("malformed");
        assert_eq!(err.code, ContentErrorCode::XmlMalformed);
        assert!(err.location.is_some());

        let err = compile_str("<Lessons/>").expect_err("root");
        assert_eq!(err.code, ContentErrorCode::InvalidRoot);

        let err = compile_str("<Defs><SpriteDef/></Defs>").expect_err("def type");
        assert_eq!(err.code, ContentErrorCode::UnknownDefType);
    }

    #[test]
    fn invalid_numbers_and_bools_error() {
        let err = compile_str(&with_commands(
            r#"<ChallengeDef><defName>c</defName><label>C</label><program><li>blink.led_on</li></program><thresholdMs>soon</thresholdMs></ChallengeDef>"#,
        ))
        .expect_err("number");
        assert_eq!(err.code, ContentErrorCode::InvalidValue);

        let err = compile_str(&with_commands(
            r#"<ChallengeDef><defName>c</defName><label>C</label><program><li>blink.led_on</li></program><maxCorruption>0</maxCorruption></ChallengeDef>"#,
        ))
        .expect_err("zero");
        assert_eq!(err.code, ContentErrorCode::InvalidValue);

        let err = compile_str(
            "<Defs><CommandDef><defName>a</defName><text>x</text><decoy>yes</decoy></CommandDef></Defs>",
        )
        .expect_err("bool");
        assert_eq!(err.code, ContentErrorCode::InvalidValue);
    }

    #[test]
    fn half_an_attack_schedule_is_rejected() {
        let err = compile_str(&with_commands(
            r#"<ChallengeDef><defName>c</defName><label>C</label><program><li>blink.led_on</li></program><attackDamage>5</attackDamage></ChallengeDef>"#,
        ))
        .expect_err("attack");
        assert_eq!(err.code, ContentErrorCode::MissingField);
    }

    #[test]
    fn duplicate_defs_across_files_error() {
        let temp = TempDir::new().expect("temp");
        write_file(&temp.path().join("a.xml"), COMMANDS_XML);
        write_file(
            &temp.path().join("b.xml"),
            "<Defs><CommandDef><defName>blink.wait</defName><text>delay(5);</text></CommandDef></Defs>",
        );
        let err = compile_lesson_database(temp.path()).expect_err("duplicate");
        assert_eq!(err.code, ContentErrorCode::DuplicateDef);
        assert!(err.file_path.ends_with("b.xml"));
    }

    #[test]
    fn program_references_are_checked() {
        let err = compile_str(&with_commands(
            r#"<ChallengeDef><defName>c</defName><label>C</label><program><li>blink.missing</li></program></ChallengeDef>"#,
        ))
        .expect_err("unresolved");
        assert_eq!(err.code, ContentErrorCode::UnresolvedReference);

        let err = compile_str(&with_commands(
            r#"<ChallengeDef><defName>c</defName><label>C</label><program><li>noise.analog</li></program></ChallengeDef>"#,
        ))
        .expect_err("decoy in program");
        assert_eq!(err.code, ContentErrorCode::InvalidValue);

        let err = compile_str(&with_commands(
            r#"<ChallengeDef><defName>c</defName><label>C</label><program><li>blink.led_on</li></program><decoys><li>noise.ghost</li></decoys></ChallengeDef>"#,
        ))
        .expect_err("unresolved decoy");
        assert_eq!(err.code, ContentErrorCode::UnresolvedReference);
    }

    #[test]
    fn repair_scene_compiles_and_checks_challenges() {
        let challenge = r#"<ChallengeDef><defName>repair.power</defName><label>Power</label><program><li>blink.led_on</li></program></ChallengeDef>"#;
        let scene = r#"<RepairSceneDef><defName>scene.circuit</defName><label>Circuit</label>
            <subsystems>
                <li><id>power</id><challenge>repair.power</challenge></li>
                <li><id>backup</id><challenge>repair.power</challenge></li>
            </subsystems>
        </RepairSceneDef>"#;
        let db = compile_str(&with_commands(&format!("{challenge}{scene}"))).expect("compile");
        let scene_def = db.repair_scene("scene.circuit").expect("scene");
        assert_eq!(scene_def.subsystems.len(), 2);
        assert_eq!(scene_def.subsystems[1].subsystem_id, SubsystemId::from("backup"));

        let broken = r#"<RepairSceneDef><defName>scene.x</defName><label>X</label>
            <subsystems><li><id>power</id><challenge>repair.ghost</challenge></li></subsystems>
        </RepairSceneDef>"#;
        let err = compile_str(&with_commands(&format!("{challenge}{broken}"))).expect_err("ghost");
        assert_eq!(err.code, ContentErrorCode::UnresolvedReference);

        let duplicate = r#"<RepairSceneDef><defName>scene.y</defName><label>Y</label>
            <subsystems>
                <li><id>power</id><challenge>repair.power</challenge></li>
                <li><id>power</id><challenge>repair.power</challenge></li>
            </subsystems>
        </RepairSceneDef>"#;
        let err = compile_str(&with_commands(&format!("{challenge}{duplicate}"))).expect_err("dup");
        assert_eq!(err.code, ContentErrorCode::InvalidValue);
    }

    #[test]
    fn empty_program_list_is_missing() {
        let err = compile_str(&with_commands(
            r#"<ChallengeDef><defName>c</defName><label>C</label><program></program></ChallengeDef>"#,
        ))
        .expect_err("empty");
        assert_eq!(err.code, ContentErrorCode::MissingField);
    }
}
