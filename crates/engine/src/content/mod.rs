mod compiler;
mod database;
mod discovery;

pub use compiler::{
    compile_lesson_database, compile_lesson_source, ContentCompileError, ContentErrorCode,
    SourceLocation,
};
pub use database::{ChallengeDef, LessonDatabase, RepairSceneDef, RepairSlotDef};
