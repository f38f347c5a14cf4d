use std::path::Path;

use challenge_engine::challenge::{ChallengeController, ChallengeState};
use challenge_engine::{
    compile_lesson_source, InputAction, InputSnapshot, Scene, SceneCommand, SceneKey,
    SceneResources,
};

use super::circuit_repair::CircuitRepairScene;
use super::program_builder::ProgramBuilderScene;

const LAB_XML: &str = r#"<Defs>
    <CommandDef><defName>led.mode</defName><text>pinMode(13, OUTPUT);</text></CommandDef>
    <CommandDef><defName>led.on</defName><text>digitalWrite(13, HIGH);</text></CommandDef>
    <CommandDef><defName>led.wait</defName><text>delay(500);</text></CommandDef>
    <CommandDef><defName>buzz.mode</defName><text>pinMode(8, OUTPUT);</text></CommandDef>
    <CommandDef><defName>buzz.tone</defName><text>tone(8, 440);</text></CommandDef>
    <CommandDef><defName>noise.a</defName><text>analogRead(13);</text><decoy>true</decoy></CommandDef>
    <CommandDef><defName>noise.b</defName><text>delay("500");</text><decoy>true</decoy></CommandDef>

    <ChallengeDef>
        <defName>lesson.led</defName>
        <label>LED basics</label>
        <program><li>led.mode</li><li>led.on</li><li>led.wait</li></program>
        <decoys><li>noise.a</li><li>noise.b</li></decoys>
        <thresholdMs>5000</thresholdMs>
        <rewardMs>1000</rewardMs>
        <maxCorruption>100</maxCorruption>
    </ChallengeDef>
    <ChallengeDef>
        <defName>repair.led</defName>
        <label>LED driver</label>
        <program><li>led.mode</li><li>led.on</li></program>
        <decoys><li>noise.a</li><li>noise.b</li></decoys>
        <thresholdMs>30000</thresholdMs>
    </ChallengeDef>
    <ChallengeDef>
        <defName>repair.buzz</defName>
        <label>Buzzer</label>
        <program><li>buzz.mode</li><li>buzz.tone</li></program>
        <decoys><li>noise.a</li><li>noise.b</li></decoys>
        <thresholdMs>30000</thresholdMs>
    </ChallengeDef>

    <RepairSceneDef>
        <defName>scene.bench</defName>
        <label>Bench repair</label>
        <subsystems>
            <li><id>led</id><challenge>repair.led</challenge></li>
            <li><id>buzzer</id><challenge>repair.buzz</challenge></li>
        </subsystems>
    </RepairSceneDef>
</Defs>"#;

fn resources() -> SceneResources {
    let lessons = compile_lesson_source(Path::new("lab.xml"), LAB_XML).expect("lab content");
    SceneResources::new(lessons, 11)
}

fn output(scene: &mut dyn Scene) -> String {
    let mut sink = Vec::new();
    scene.render(&mut sink).expect("render");
    String::from_utf8(sink).expect("utf8")
}

fn press(scene: &mut dyn Scene, action: InputAction) -> SceneCommand {
    scene.update(0, &InputSnapshot::empty().with_action(action))
}

fn correct_choice(controller: &ChallengeController) -> InputAction {
    let set = controller.current_option_set().expect("visible set");
    InputAction::Choose(set.correct_position().expect("correct option") + 1)
}

fn wrong_choice(controller: &ChallengeController) -> InputAction {
    let set = controller.current_option_set().expect("visible set");
    let correct = set.correct_position().expect("correct option");
    let wrong = (0..set.options.len())
        .find(|position| *position != correct)
        .expect("decoy");
    InputAction::Choose(wrong + 1)
}

fn loaded_program_builder() -> ProgramBuilderScene {
    let mut scene = ProgramBuilderScene::new("lesson.led", SceneKey::B);
    scene.load(&resources());
    scene
}

#[test]
fn program_builder_opens_with_title_and_menu() {
    let mut scene = loaded_program_builder();
    let text = output(&mut scene);

    assert!(text.starts_with("== LED basics ==\n"), "{text}");
    assert!(text.contains("Step 1/3: pick the next line of the program"));
    assert!(text.contains("  1) ") && text.contains("  2) ") && text.contains("  3) "));
    assert_eq!(
        scene.controller().expect("controller").state(),
        ChallengeState::Presenting
    );
    assert_eq!(
        scene.debug_title().as_deref(),
        Some("LED basics [presenting]")
    );
}

#[test]
fn correct_answers_advance_to_completion() {
    let mut scene = loaded_program_builder();
    let _ = output(&mut scene);

    let action = correct_choice(scene.controller().expect("controller"));
    assert_eq!(press(&mut scene, action), SceneCommand::None);
    let text = output(&mut scene);
    assert!(text.contains("+ line 1 accepted"), "{text}");
    assert!(text.contains("Step 2/3"), "{text}");

    for _ in 0..2 {
        let action = correct_choice(scene.controller().expect("controller"));
        press(&mut scene, action);
    }
    let text = output(&mut scene);
    assert!(text.contains("* program complete"), "{text}");
    assert_eq!(
        scene.controller().expect("controller").state(),
        ChallengeState::AllStepsComplete
    );

    press(&mut scene, InputAction::Choose(1));
    assert!(output(&mut scene).contains("there is no option 1 right now"));
}

#[test]
fn wrong_answers_are_marked_and_repeats_ignored() {
    let mut scene = loaded_program_builder();
    let _ = output(&mut scene);

    let action = wrong_choice(scene.controller().expect("controller"));
    press(&mut scene, action);
    let text = output(&mut scene);
    assert!(text.contains("x that line does not belong here"), "{text}");
    assert!(text.contains("(rejected)"), "{text}");

    press(&mut scene, action);
    assert!(output(&mut scene).contains("(ignored: that option was already rejected)"));
    assert_eq!(
        scene
            .controller()
            .expect("controller")
            .session()
            .sequencer()
            .current_index(),
        0
    );
}

#[test]
fn ticking_past_the_threshold_infects_and_restart_recovers() {
    let mut scene = loaded_program_builder();
    let _ = output(&mut scene);

    for _ in 0..5 {
        scene.update(1000, &InputSnapshot::empty());
    }
    let text = output(&mut scene);
    assert!(text.contains("!! system infected, type r to restart"), "{text}");

    press(&mut scene, InputAction::Restart);
    let text = output(&mut scene);
    assert!(text.contains("~ restarted, attempt 2"), "{text}");
    assert!(text.contains("Step 1/3"), "{text}");
    let snapshot = scene.controller().expect("controller").snapshot();
    assert_eq!(snapshot.state, ChallengeState::Presenting);
    assert_eq!(snapshot.corruption_percent, 0.0);
}

#[test]
fn quit_switch_and_unknown_input() {
    let mut scene = loaded_program_builder();
    let _ = output(&mut scene);

    let command = scene.update(0, &InputSnapshot::from_lines(["dance"]));
    assert_eq!(command, SceneCommand::None);
    assert!(output(&mut scene).contains("unknown input 'dance', type h for help"));

    assert_eq!(
        press(&mut scene, InputAction::SwitchScene),
        SceneCommand::SwitchTo(SceneKey::B)
    );
    assert_eq!(press(&mut scene, InputAction::Quit), SceneCommand::Quit);
}

#[test]
fn missing_lesson_reports_instead_of_panicking() {
    let mut scene = ProgramBuilderScene::new("lesson.ghost", SceneKey::B);
    scene.load(&resources());
    assert!(output(&mut scene).contains("lesson 'lesson.ghost' is not in the lesson database"));
    assert!(scene.controller().is_none());
    assert_eq!(
        scene.update(1000, &InputSnapshot::empty().with_action(InputAction::Choose(1))),
        SceneCommand::None
    );
}

fn loaded_circuit_repair() -> CircuitRepairScene {
    let mut scene = CircuitRepairScene::new("scene.bench", SceneKey::A);
    scene.load(&resources());
    scene
}

#[test]
fn circuit_repair_lists_subsystems_and_focuses_first() {
    let mut scene = loaded_circuit_repair();
    let text = output(&mut scene);

    assert!(text.contains("== Bench repair =="), "{text}");
    assert!(text.contains("> 1. led"), "{text}");
    assert!(text.contains("  2. buzzer"), "{text}");
    assert!(text.contains("[led] focused"), "{text}");
    assert_eq!(scene.focused_index(), 0);
    assert_eq!(
        scene.debug_title().as_deref(),
        Some("Bench repair [0/2 repaired]")
    );
}

#[test]
fn focus_switches_the_answering_subsystem() {
    let mut scene = loaded_circuit_repair();
    let _ = output(&mut scene);

    press(&mut scene, InputAction::Focus(2));
    assert_eq!(scene.focused_index(), 1);
    assert!(output(&mut scene).contains("[buzzer] focused"));

    let action = correct_choice(scene.focused_controller().expect("buzzer"));
    press(&mut scene, action);
    assert!(output(&mut scene).contains("[buzzer] + line 1 accepted"));

    let led = scene.slot_controller(0).expect("led");
    assert_eq!(led.session().sequencer().current_index(), 0);

    press(&mut scene, InputAction::Focus(9));
    assert!(output(&mut scene).contains("there is no subsystem 9; choose 1-2"));
    assert_eq!(scene.focused_index(), 1);
}

#[test]
fn repairing_every_subsystem_restores_the_circuit() {
    let mut scene = loaded_circuit_repair();
    let _ = output(&mut scene);

    for slot in 1..=2 {
        press(&mut scene, InputAction::Focus(slot));
        while scene.focused_controller().expect("focused").state() == ChallengeState::Presenting {
            let action = correct_choice(scene.focused_controller().expect("focused"));
            press(&mut scene, action);
        }
    }

    let text = output(&mut scene);
    assert!(text.contains("* subsystem led repaired"), "{text}");
    assert!(text.contains("* subsystem buzzer repaired"), "{text}");
    assert_eq!(
        text.matches("*** all subsystems repaired, circuit restored")
            .count(),
        1
    );
    assert!(scene.is_restored());
    assert_eq!(scene.aggregator().expect("aggregator").repaired_count(), 2);

    scene.update(60_000, &InputSnapshot::empty());
    assert_eq!(
        scene.slot_controller(0).expect("led").state(),
        ChallengeState::AllStepsComplete
    );
    press(&mut scene, InputAction::Restart);
    assert!(output(&mut scene).contains("the circuit is already restored"));
}

#[test]
fn infected_subsystem_can_be_restarted_alone() {
    let mut scene = loaded_circuit_repair();
    let _ = output(&mut scene);

    scene.update(30_000, &InputSnapshot::empty());
    let text = output(&mut scene);
    assert!(text.contains("[led] !! system infected"), "{text}");
    assert!(text.contains("[buzzer] !! system infected"), "{text}");

    press(&mut scene, InputAction::Restart);
    assert_eq!(
        scene.slot_controller(0).expect("led").state(),
        ChallengeState::Presenting
    );
    assert_eq!(
        scene.slot_controller(1).expect("buzzer").state(),
        ChallengeState::Infected
    );
    assert!(output(&mut scene).contains("[led] ~ restarted, attempt 2"));
}
