// Snapshot tests: lock generated C output to detect unintended behavior changes.
//
// Uses the library API (load → run_pipeline → generated) directly on the
// JSON fixtures under `compiler/tests/fixtures/`. The provenance header line
// is dropped before comparison since it embeds the crate version.
//
// Run `cargo insta review` after intentional output changes to update baselines.

use std::path::{Path, PathBuf};

use mtlc::codegen::{CodegenOptions, TargetKind};
use mtlc::ir::Program;
use mtlc::pass::PassId;
use mtlc::pipeline::{run_pipeline, CompilationState};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn lower(name: &str, terminal: PassId, options: &CodegenOptions) -> String {
    let program = Program::load(&fixture(name))
        .unwrap_or_else(|e| panic!("cannot load {}: {}", name, e));
    let mut state = CompilationState::new(program);
    run_pipeline(&mut state, terminal, options, |_, _| {})
        .unwrap_or_else(|e| panic!("{}: {} ({:?})", name, e, state_diags(name)));
    let generated = state.generated(options);
    let text = match terminal {
        PassId::Apply => generated.kernel_source,
        PassId::Initializer => generated.user_source,
        _ => generated.types,
    }
    .unwrap_or_else(|| panic!("nothing generated for {}", name));
    without_header(&text).to_string()
}

fn state_diags(name: &str) -> Vec<String> {
    let program = Program::load(&fixture(name)).unwrap();
    let mut state = CompilationState::new(program);
    let _ = run_pipeline(&mut state, PassId::Apply, &CodegenOptions::default(), |_, _| {});
    state.diagnostics.iter().map(|d| d.to_string()).collect()
}

fn without_header(text: &str) -> &str {
    assert!(text.starts_with("/* Automatically generated by mtlc "));
    text.split_once('\n').map(|(_, rest)| rest).unwrap_or("")
}

#[test]
fn snapshot_router_kernel() {
    let kernel = lower("router.json", PassId::Apply, &CodegenOptions::default());
    insta::assert_snapshot!(kernel.trim_end(), @r###"
#include "ebpf_kernel.h"

struct route_key {
    u32 prefixlen;
    u32 field0; /* hdr.ipv4.dst */
} __attribute__((aligned(4)));
#define ROUTE_ACT_FORWARD 1
#define ROUTE_ACT_DROP 2
struct route_value {
    unsigned int action;
    union {
        struct {
        } _NoAction;
        struct {
            u16 port;
        } forward;
        struct {
        } drop;
    } u;
};

struct stats_key {
    u8 __dummy_table_key;
} __attribute__((aligned(4)));
#define STATS_ACT_COUNT 1
struct stats_value {
    unsigned int action;
    union {
        struct {
        } _NoAction;
        struct {
        } count;
    } u;
};

typedef u32 pkts_key;
typedef u32 pkts_value;

REGISTER_TABLE_FLAGS(route, BPF_MAP_TYPE_LPM_TRIE, struct route_key, struct route_value, 1024, BPF_F_NO_PREALLOC)
REGISTER_TABLE(route_defaultAction, BPF_MAP_TYPE_ARRAY, u32, struct route_value, 1)
REGISTER_TABLE(stats_defaultAction, BPF_MAP_TYPE_ARRAY, u32, struct stats_value, 1)
REGISTER_TABLE(pkts, BPF_MAP_TYPE_ARRAY, pkts_key, pkts_value, 256)

static __always_inline int apply_route(struct headers *hdr) {
    u32 ebpf_zero = 0;
    {
        struct route_key key = {};
        key.prefixlen = sizeof(key)*8 - 32;
        key.field0 = bpf_htonl(hdr->ipv4.dst);
        struct route_value *value = NULL;
        value = BPF_MAP_LOOKUP_ELEM(route, &key);
        if (value == NULL) {
            value = BPF_MAP_LOOKUP_ELEM(route_defaultAction, &ebpf_zero);
        }
        if (value == NULL) {
            return TC_ACT_SHOT;
        }
        switch (value->action) {
            case 0:
                {
                }
                break;
            case ROUTE_ACT_FORWARD:
                {
                    hdr->std.egress_port = value->u.forward.port;
                }
                break;
            case ROUTE_ACT_DROP:
                {
                }
                break;
            default:
                return TC_ACT_SHOT;
        }
    }
    return 0;
}

static __always_inline int apply_stats(struct headers *hdr) {
    u32 ebpf_zero = 0;
    {
        struct stats_value *value_0 = NULL;
        value_0 = BPF_MAP_LOOKUP_ELEM(stats_defaultAction, &ebpf_zero);
        if (value_0 == NULL) {
            return TC_ACT_SHOT;
        }
        switch (value_0->action) {
            case STATS_ACT_COUNT:
                {
                    pkts_value *value_1;
                    pkts_value init_val = 1;
                    pkts_key key_0 = hdr->ipv4.protocol;
                    value_1 = BPF_MAP_LOOKUP_ELEM(pkts, &key_0);
                    if (value_1 != NULL)
                        __sync_fetch_and_add(value_1, 1);
                    else
                        BPF_MAP_UPDATE_ELEM(pkts, &key_0, &init_val, BPF_ANY);
                }
                break;
            default:
                return TC_ACT_SHOT;
        }
    }
    return 0;
}
"###);
}

#[test]
fn snapshot_router_user() {
    let user = lower("router.json", PassId::Initializer, &CodegenOptions::default());
    let init = &user[user.find("void init_tables").unwrap()..];
    insta::assert_snapshot!(init.trim_end(), @r###"
void init_tables(void) {
    u32 ebpf_zero = 0;
    {
        int tableFileDescriptor = BPF_OBJ_GET(MAP_PATH "/route_defaultAction");
        if (tableFileDescriptor < 0) { fprintf(stderr, "map route_defaultAction not loaded\n"); exit(1); }
        struct route_value value = {
            .action = 0,
            .u = {._NoAction = {}},
        };
        int ok = BPF_USER_MAP_UPDATE_ELEM(tableFileDescriptor, &ebpf_zero, &value, BPF_ANY);
        if (ok != 0) { perror("Could not write in route_defaultAction"); exit(1); }
    }
    {
        int tableFileDescriptor = BPF_OBJ_GET(MAP_PATH "/route");
        if (tableFileDescriptor < 0) { fprintf(stderr, "map route not loaded\n"); exit(1); }
        {
            struct route_key key = {.prefixlen = sizeof(struct route_key)*8 - 32, .field0 = bpf_htonl(167772160), };
            struct route_value value = {
                .action = ROUTE_ACT_FORWARD,
                .u = {.forward = {.port = 7, }},
            };
            int ok = BPF_USER_MAP_UPDATE_ELEM(tableFileDescriptor, &key, &value, BPF_ANY);
            if (ok != 0) { perror("Could not write in route"); exit(1); }
        }
    }
    {
        int tableFileDescriptor_0 = BPF_OBJ_GET(MAP_PATH "/stats_defaultAction");
        if (tableFileDescriptor_0 < 0) { fprintf(stderr, "map stats_defaultAction not loaded\n"); exit(1); }
        struct stats_value value_0 = {
            .action = STATS_ACT_COUNT,
            .u = {.count = {}},
        };
        int ok_0 = BPF_USER_MAP_UPDATE_ELEM(tableFileDescriptor_0, &ebpf_zero, &value_0, BPF_ANY);
        if (ok_0 != 0) { perror("Could not write in stats_defaultAction"); exit(1); }
    }
}
"###);
}

#[test]
fn user_file_includes_loader_headers_and_types() {
    let user = lower("router.json", PassId::Initializer, &CodegenOptions::default());
    assert!(user.starts_with("#include <stdio.h>\n#include <stdlib.h>\n#include \"ebpf_user.h\"\n\n"));
    assert!(user.contains("struct route_key {\n"));
    assert!(!user.contains("REGISTER_TABLE"));
}

#[test]
fn traced_apply_reports_key_miss_and_params() {
    let options = CodegenOptions {
        target: TargetKind::Kernel,
        emit_trace_messages: true,
    };
    let kernel = lower("router.json", PassId::Apply, &options);
    for line in [
        "        bpf_trace_message(\"Control: key hdr.ipv4.dst=0x%llx\\n\", (unsigned long long) key.field0);\n",
        "            bpf_trace_message(\"Control: route miss, using default action\\n\");\n",
        "            bpf_trace_message(\"Control: route has no default action, aborting\\n\");\n",
        "                bpf_trace_message(\"Control: executing action forward\\n\");\n",
        "                bpf_trace_message(\"Control: param port=0x%llx (9 bits)\\n\", (unsigned long long) (value->u.forward.port));\n",
        "                bpf_trace_message(\"Control: Invalid action type, aborting\\n\");\n",
    ] {
        assert!(kernel.contains(line), "missing {:?} in\n{}", line, kernel);
    }
}

#[test]
fn bcc_target_uses_method_helpers() {
    let options = CodegenOptions {
        target: TargetKind::Bcc,
        emit_trace_messages: false,
    };
    let kernel = lower("router.json", PassId::Apply, &options);
    assert!(kernel.starts_with("#include <uapi/linux/bpf.h>\n"));
    assert!(kernel.contains(
        "BPF_TABLE(\"lpm_trie\", struct route_key, struct route_value, route, 1024);\n"
    ));
    assert!(kernel.contains("        value = route.lookup(&key);\n"));
    assert!(kernel.contains("                        pkts.update(&key_0, &init_val);\n"));
    assert!(kernel.contains("                return 1;\n"));
}
