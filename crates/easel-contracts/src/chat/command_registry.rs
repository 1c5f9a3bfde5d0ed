#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "style",
        action: "set_style",
    },
    CommandSpec {
        command: "model",
        action: "set_model",
    },
];

pub(crate) const INDEX_ARG_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "reuse",
    action: "reuse",
}];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "styles",
        action: "list_styles",
    },
    CommandSpec {
        command: "style_on",
        action: "enable_style",
    },
    CommandSpec {
        command: "style_off",
        action: "disable_style",
    },
    CommandSpec {
        command: "prompt",
        action: "show_prompt",
    },
    CommandSpec {
        command: "history",
        action: "list_history",
    },
    CommandSpec {
        command: "clear",
        action: "clear_history",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub(crate) const SAVE_COMMAND: CommandSpec = CommandSpec {
    command: "save",
    action: "save",
};

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/help",
    "/styles",
    "/style",
    "/style_on",
    "/style_off",
    "/model",
    "/prompt",
    "/history",
    "/save",
    "/reuse",
    "/clear",
    "/quit",
];
