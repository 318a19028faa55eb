// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All network construction and training code lives here.
//
//   ops.rs      — activations, activity regularizers, losses,
//                 crop / pad to target shape, nearest-neighbour
//                 upsampling, caller layout <-> NCHW
//
//   network.rs  — Graph (plain-data plan of every stage) and
//                 Network<B> (the Burn module with the weights)
//
//   builder.rs  — GraphBuilder trait and its implementations for
//                 the baseline, dense and conv autoencoders
//
//   trainer.rs  — epoch / batch loop, stop token, checkpointing
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// Tensor-level helpers shared by the network and trainer
pub mod ops;

/// Stage plans and the weight-carrying module
pub mod network;

/// Parameters → graph assembly
pub mod builder;

/// Training loop with holdout scoring and checkpointing
pub mod trainer;
